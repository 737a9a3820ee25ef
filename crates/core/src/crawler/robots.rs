//! Robots.txt dispatch (§4.2, §4.4 step 3): builds the `/robots.txt` Job for
//! a host the registry has just created, and turns a fetched robots.txt
//! body into a `RobotsPolicy` plus any sitemap Jobs it should enqueue.

use url::Url;

use crate::crawler::host::RobotsPolicy;
use crate::crawler::{HostKey, HostRegistry, Job};

/// Builds the robots.txt-fetching Job for `key`, rooted at `origin`'s
/// scheme/host/port (§4.2 "the registry seeds exactly one robots Job per
/// host, ahead of anything else").
pub fn job_for(key: &HostKey, origin: &Url) -> Option<Job> {
    let mut robots_url = origin.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);
    Some(Job::robots(key.clone(), robots_url))
}

/// Applies a fetched robots.txt body to the registry and returns the
/// sitemap Jobs discovered in it, ready to enqueue. Called once the Job in
/// `job_for` completes, whatever its status: a 404 still resolves to an
/// "allow everything" policy via `RobotsPolicy::default`, matching
/// `robots_allows`'s `None => true` fallback for hosts it's never heard
/// from, except here the registry explicitly records that emptiness so
/// `robots_job_pending` clears and other queued Jobs can proceed.
pub async fn apply(
    registry: &HostRegistry,
    key: &HostKey,
    user_agent: &str,
    ignore_robots: bool,
    status: u16,
    body: Option<&str>,
) -> Vec<Url> {
    let policy = if ignore_robots {
        RobotsPolicy::default()
    } else {
        match (status, body) {
            (200, Some(body)) => RobotsPolicy::from_body(user_agent, body),
            _ => RobotsPolicy::default(),
        }
    };

    let sitemaps = policy.sitemaps.clone();
    registry.set_robots_policy(key, policy).await;
    sitemaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> HostKey {
        HostKey { scheme: "http".to_string(), host: "a.com".to_string(), port: 80 }
    }

    #[test]
    fn job_for_points_at_root_robots_txt() {
        let origin = Url::parse("http://a.com/some/deep/path?x=1").unwrap();
        let job = job_for(&key(), &origin).unwrap();
        assert_eq!(job.target.as_str(), "http://a.com/robots.txt");
        assert!(job.is_robots);
        assert!(job.ignore_patterns);
    }

    #[tokio::test]
    async fn apply_ignore_robots_allows_everything() {
        let registry = HostRegistry::new(20, std::time::Duration::from_millis(1));
        let k = key();
        registry.get_or_create(&k).await;

        let body = "User-agent: *\nDisallow: /";
        let sitemaps = apply(&registry, &k, "retriever/1.0", true, 200, Some(body)).await;
        assert!(sitemaps.is_empty());
        assert!(registry.robots_allows(&k, &Url::parse("http://a.com/anything").unwrap()).await);
    }

    #[tokio::test]
    async fn apply_honors_disallow_when_not_ignored() {
        let registry = HostRegistry::new(20, std::time::Duration::from_millis(1));
        let k = key();
        registry.get_or_create(&k).await;

        let body = "User-agent: *\nDisallow: /private\nSitemap: http://a.com/sitemap.xml";
        let sitemaps = apply(&registry, &k, "retriever/1.0", false, 200, Some(body)).await;
        assert_eq!(sitemaps.len(), 1);
        assert!(!registry.robots_allows(&k, &Url::parse("http://a.com/private/x").unwrap()).await);
        assert!(registry.robots_allows(&k, &Url::parse("http://a.com/public").unwrap()).await);
    }

    #[tokio::test]
    async fn apply_missing_robots_txt_allows_everything() {
        let registry = HostRegistry::new(20, std::time::Duration::from_millis(1));
        let k = key();
        registry.get_or_create(&k).await;

        let sitemaps = apply(&registry, &k, "retriever/1.0", false, 404, None).await;
        assert!(sitemaps.is_empty());
        assert!(registry.robots_allows(&k, &Url::parse("http://a.com/anything").unwrap()).await);
    }
}
