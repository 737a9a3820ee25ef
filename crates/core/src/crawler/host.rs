//! The Host Registry (§4.2): one entry per `(scheme, host, port)`, each
//! holding its own FIFO job queue, robots policy, and back-off state.
//! Guarded by a single global `tokio::sync::Mutex` per §5 rather than one
//! lock per host — workers only hold it around queue bookkeeping, never
//! across network I/O.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use url::Url;

use super::Job;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    pub fn from_url(url: &Url) -> Option<HostKey> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(HostKey {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// The robots.txt-derived policy for a host: the full RFC 9309 matcher from
/// the `robotstxt` crate, plus the sitemap URLs and crawl-delay it parsed out
/// of the same body. A host with no robots policy yet (or a 404 on
/// `/robots.txt`) allows everything — an unknown policy is never treated as
/// a disallow.
#[derive(Default)]
pub struct RobotsPolicy {
    pub robots: Option<robotstxt::Robots>,
    pub sitemaps: Vec<Url>,
}

impl RobotsPolicy {
    pub fn from_body(user_agent: &str, body: &str) -> Self {
        match robotstxt::Robots::parse(user_agent, body) {
            Ok(robots) => {
                let sitemaps = robots
                    .sitemaps()
                    .iter()
                    .filter_map(|s| Url::parse(s).ok())
                    .collect();
                RobotsPolicy {
                    robots: Some(robots),
                    sitemaps,
                }
            }
            Err(e) => {
                tracing::debug!("failed to parse robots.txt: {e}");
                RobotsPolicy::default()
            }
        }
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        match &self.robots {
            Some(robots) => robots.is_allowed(url),
            None => true,
        }
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.robots.as_ref().and_then(|r| r.crawl_delay())
    }
}

pub struct Host {
    pub key: HostKey,
    pub queue: VecDeque<Job>,
    pub robots: Option<RobotsPolicy>,
    pub robots_job_pending: bool,
    pub failures: u32,
    pub next_eligible_time: Option<Instant>,
    pub final_failed: bool,
    pub crawled_paths: HashSet<String>,
}

impl Host {
    fn new(key: HostKey) -> Self {
        Host {
            key,
            queue: VecDeque::new(),
            robots: None,
            robots_job_pending: false,
            failures: 0,
            next_eligible_time: None,
            final_failed: false,
            crawled_paths: HashSet::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.robots_job_pending
    }
}

/// What `get_job` hands back to a worker (§4.2/§4.3).
pub enum GetJobOutcome {
    Job(Job),
    WaitUntil(Duration),
    None,
}

/// The host map, plus the back-off and failure policy described in §4.2.
/// Every public method takes the async mutex internally; callers never see
/// the lock guard, which keeps the "release before I/O" discipline (§5)
/// structural rather than a convention to remember.
pub struct HostRegistry {
    inner: tokio::sync::Mutex<HashMap<HostKey, Host>>,
    tries_limit: u32,
    waitretry: Duration,
}

impl HostRegistry {
    pub fn new(tries_limit: u32, waitretry: Duration) -> Self {
        HostRegistry {
            inner: tokio::sync::Mutex::new(HashMap::new()),
            tries_limit,
            waitretry,
        }
    }

    /// Returns the host's robots policy if known, without creating it.
    pub async fn get_or_create(&self, key: &HostKey) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.contains_key(key) {
            false
        } else {
            guard.insert(key.clone(), Host::new(key.clone()));
            true
        }
    }

    pub async fn mark_robots_pending(&self, key: &HostKey) {
        let mut guard = self.inner.lock().await;
        if let Some(host) = guard.get_mut(key) {
            host.robots_job_pending = true;
        }
    }

    pub async fn set_robots_policy(&self, key: &HostKey, policy: RobotsPolicy) {
        let mut guard = self.inner.lock().await;
        if let Some(host) = guard.get_mut(key) {
            host.robots = Some(policy);
            host.robots_job_pending = false;
        }
    }

    pub async fn robots_allows(&self, key: &HostKey, url: &Url) -> bool {
        let guard = self.inner.lock().await;
        match guard.get(key).and_then(|h| h.robots.as_ref()) {
            Some(policy) => policy.is_allowed(url),
            None => true,
        }
    }

    pub async fn crawl_delay(&self, key: &HostKey) -> Option<Duration> {
        let guard = self.inner.lock().await;
        guard.get(key).and_then(|h| h.robots.as_ref()).and_then(|p| p.crawl_delay())
    }

    pub async fn sitemaps(&self, key: &HostKey) -> Vec<Url> {
        let guard = self.inner.lock().await;
        guard
            .get(key)
            .and_then(|h| h.robots.as_ref())
            .map(|r| r.sitemaps.clone())
            .unwrap_or_default()
    }

    pub async fn add_job(&self, job: Job) {
        let mut guard = self.inner.lock().await;
        if let Some(host) = guard.get_mut(&job.host_key) {
            if job.is_robots {
                host.queue.push_front(job);
            } else {
                host.queue.push_back(job);
            }
        }
    }

    /// Selects the next ready Job for `key`, per the ordering rule in §4.2:
    /// back-off first, then the robots Job (if still pending), then FIFO.
    pub async fn get_job(&self, key: &HostKey) -> GetJobOutcome {
        let mut guard = self.inner.lock().await;
        let Some(host) = guard.get_mut(key) else {
            return GetJobOutcome::None;
        };

        if let Some(eligible_at) = host.next_eligible_time {
            let now = Instant::now();
            if eligible_at > now {
                return GetJobOutcome::WaitUntil(eligible_at - now);
            }
            host.next_eligible_time = None;
        }

        if host.robots_job_pending {
            if let Some(pos) = host.queue.iter().position(|j| j.is_robots) {
                return GetJobOutcome::Job(host.queue.remove(pos).unwrap());
            }
            return GetJobOutcome::None;
        }

        match host.queue.pop_front() {
            Some(job) => GetJobOutcome::Job(job),
            None => GetJobOutcome::None,
        }
    }

    pub async fn increase_failure(&self, key: &HostKey) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(host) = guard.get_mut(key) else {
            return false;
        };

        host.failures += 1;
        let backoff_factor = host.failures.min(10);
        host.next_eligible_time = Some(Instant::now() + self.waitretry * backoff_factor);

        if host.failures >= self.tries_limit {
            host.final_failed = true;
            host.queue.clear();
            true
        } else {
            false
        }
    }

    pub async fn reset_failure(&self, key: &HostKey) {
        let mut guard = self.inner.lock().await;
        if let Some(host) = guard.get_mut(key) {
            host.failures = 0;
        }
    }

    pub async fn release_jobs(&self, key: &HostKey, jobs: Vec<Job>) {
        let mut guard = self.inner.lock().await;
        if let Some(host) = guard.get_mut(key) {
            for job in jobs.into_iter().rev() {
                host.queue.push_front(job);
            }
        }
    }

    pub async fn mark_crawled(&self, key: &HostKey, path: &str) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.get_mut(key) {
            Some(host) => host.crawled_paths.insert(path.to_string()),
            None => true,
        }
    }

    /// True when every known host is idle (empty queue, no pending robots
    /// Job) — used by the quiescence check in `scheduler` (§4.3).
    pub async fn all_idle(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.values().all(Host::is_idle)
    }

    pub async fn queue_len(&self, key: &HostKey) -> usize {
        let guard = self.inner.lock().await;
        guard.get(key).map(|h| h.queue.len()).unwrap_or(0)
    }

    pub async fn total_queued(&self) -> usize {
        let guard = self.inner.lock().await;
        guard.values().map(|h| h.queue.len()).sum()
    }

    /// Picks a host with ready work that isn't already claimed by another
    /// worker, so idle workers fan out across hosts instead of piling onto
    /// whichever one happened to be created first (§4.3 "worker pool
    /// sizing"). Returns `None` once every host is either idle or already
    /// claimed.
    pub async fn claim_host_with_work(&self, busy: &HashSet<HostKey>) -> Option<HostKey> {
        let guard = self.inner.lock().await;
        guard
            .values()
            .find(|host| !host.is_idle() && !busy.contains(&host.key))
            .map(|host| host.key.clone())
    }
}
