//! The concurrent download engine (§2/§4 of the design): per-host job
//! queues, a worker pool, a response pipeline, and the Metalink/chunk
//! engine. A small set of plain data types here, one file per concern
//! alongside.

pub mod caches;
pub mod client;
pub mod conversion;
pub mod filename;
pub mod filters;
pub mod host;
pub mod multisource;
pub mod pipeline;
pub mod robots;
pub mod scheduler;
pub mod sink;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::url_ext::UrlExt;

pub use host::{Host, HostKey, HostRegistry};
pub use scheduler::Retriever;

pub const MAX_URL_LEN_BYTES: usize = 8192;

/// One mirror entry for a Metalink-described resource.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub url: Url,
    pub priority: u32,
    pub location: Option<String>,
}

/// One checksummed piece of a Metalink-described resource.
#[derive(Debug, Clone)]
pub struct Piece {
    pub index: usize,
    pub length: u64,
    pub sha256: String,
}

/// A file description split into mirrors and checksummed pieces (§3).
#[derive(Debug, Clone)]
pub struct Metalink {
    pub file_name: String,
    pub total_size: u64,
    pub pieces: Vec<Piece>,
    pub mirrors: Vec<Mirror>,
    /// The whole-file checksum, when the descriptor carries one in addition
    /// to (or instead of) per-piece hashes (§8 "Round-trip of Metalink").
    pub file_hash: Option<String>,
}

impl Metalink {
    /// A synthetic single-mirror descriptor for plain chunked retrieval
    /// (§4.5 "HEAD responses"): one mirror at the origin URL, pieces cut at
    /// `chunk_size` boundaries with no checksum to verify.
    pub fn synthetic_chunks(origin: Url, total_size: u64, chunk_size: u64) -> Self {
        let mut pieces = Vec::new();
        let mut offset = 0u64;
        let mut index = 0;
        while offset < total_size {
            let length = chunk_size.min(total_size - offset);
            pieces.push(Piece {
                index,
                length,
                sha256: String::new(),
            });
            offset += length;
            index += 1;
        }

        Metalink {
            file_name: origin
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("index.html")
                .to_string(),
            total_size,
            pieces,
            mirrors: vec![Mirror {
                url: origin,
                priority: 1,
                location: None,
            }],
            file_hash: None,
        }
    }

    pub fn is_checksummed(&self) -> bool {
        self.pieces.iter().any(|p| !p.sha256.is_empty())
    }
}

/// A byte-range sub-retrieval of a multi-part Job (§3).
#[derive(Debug, Clone)]
pub struct Part {
    pub id: usize,
    pub position: u64,
    pub length: u64,
    pub done: bool,
    pub inuse: bool,
}

impl Part {
    pub fn from_piece(piece: &Piece, position: u64) -> Self {
        Part {
            id: piece.index,
            position,
            length: piece.length,
            done: false,
            inuse: false,
        }
    }
}

/// An HTTP authentication challenge cached on a Job after a 401/407 (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest { realm: String, nonce: String },
}

/// One pending retrieval (§3). `host_key` is a registry lookup key, never
/// an owning pointer back to the `Host` (§9 Design Notes: cyclic
/// references).
#[derive(Debug, Clone)]
pub struct Job {
    pub target: Url,
    pub original: Url,
    pub referer: Option<Url>,
    pub local_filename: Option<PathBuf>,
    pub redirection_level: usize,
    pub recursion_level: u32,
    pub head_first: bool,
    pub is_robots: bool,
    pub is_sitemap: bool,
    pub ignore_patterns: bool,
    pub server_challenge: Option<AuthScheme>,
    pub proxy_challenge: Option<AuthScheme>,
    pub metalink: Option<Metalink>,
    pub parts: Vec<Part>,
    pub inuse: bool,
    pub host_key: HostKey,
    pub retries: u8,
}

impl Job {
    pub fn seed(target: Url, host_key: HostKey) -> Self {
        Job {
            original: target.clone(),
            target,
            referer: None,
            local_filename: None,
            redirection_level: 0,
            recursion_level: 0,
            head_first: false,
            is_robots: false,
            is_sitemap: false,
            ignore_patterns: false,
            server_challenge: None,
            proxy_challenge: None,
            metalink: None,
            parts: Vec::new(),
            inuse: false,
            host_key,
            retries: 0,
        }
    }

    pub fn robots(host_key: HostKey, url: Url) -> Self {
        Job {
            is_robots: true,
            ignore_patterns: true,
            ..Job::seed(url, host_key)
        }
    }

    pub fn child(&self, target: Url, recursion_level: u32) -> Job {
        Job {
            original: target.clone(),
            target,
            referer: Some(self.target.clone()),
            local_filename: None,
            redirection_level: 0,
            recursion_level,
            head_first: false,
            is_robots: false,
            is_sitemap: self.is_sitemap,
            ignore_patterns: false,
            server_challenge: None,
            proxy_challenge: None,
            metalink: None,
            parts: Vec::new(),
            inuse: false,
            host_key: self.host_key.clone(),
            retries: 0,
        }
    }

    pub fn redirected(&self, location: Url, host_key: HostKey) -> Job {
        Job {
            original: self.original.clone(),
            target: location,
            referer: self.referer.clone(),
            local_filename: None,
            redirection_level: self.redirection_level + 1,
            recursion_level: self.recursion_level,
            head_first: self.head_first,
            is_robots: self.is_robots,
            is_sitemap: self.is_sitemap,
            ignore_patterns: self.ignore_patterns,
            server_challenge: None,
            proxy_challenge: None,
            metalink: None,
            parts: Vec::new(),
            inuse: false,
            host_key,
            retries: 0,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.metalink.is_some()
    }

    pub fn all_parts_done(&self) -> bool {
        self.is_multipart() && self.parts.iter().all(|p| p.done)
    }
}

/// Arc-shared collaborators every crawler subsystem needs. Grouping these
/// avoids threading six separate `Arc`s through every function signature,
/// bundling shared state behind one cheaply-cloned struct instead.
#[derive(Clone)]
pub struct Shared {
    pub config: Arc<crate::config::Config>,
    pub stats: Arc<crate::stats::Stats>,
    pub exit_status: Arc<crate::error::ExitStatus>,
    pub fingerprints: Arc<crate::fingerprint::FingerprintSet>,
    pub conversions: Arc<conversion::ConversionRecorder>,
    pub caches: Arc<caches::ProtocolCaches>,
    pub etags: Arc<pipeline::EtagCache>,
    pub terminate: Arc<std::sync::atomic::AtomicBool>,
    /// Set on a second SIGINT or any SIGTERM (§4.3/§5 Cancellation): unlike
    /// `terminate`, which lets in-flight requests finish, this tells the
    /// coordinator to stop waiting on worker tasks altogether rather than
    /// join them.
    pub abort_now: Arc<std::sync::atomic::AtomicBool>,
    /// Compiled once at startup (§4.8) and shared read-only by every
    /// worker, so a discovered child URL can run the full admission chain
    /// (§4.4 step 5) from wherever it was found rather than bouncing back
    /// through the coordinator.
    pub filters: Arc<filters::Filters>,
    /// Normalized URLs whose body actually landed on disk this run (§4.7).
    /// `finish_conversions` is the only reader: a link recorded by the
    /// parser but never present here was discovered, not retrieved, and
    /// must be left as an absolute URL rather than rewritten to a path that
    /// was never written.
    pub saved_urls: Arc<dashmap::DashSet<String>>,
}

/// One child URL surfaced while parsing a saved document, admitted through
/// `crawler::admit` from whichever worker found it (§4.4 "Discovery").
#[derive(Debug, Clone)]
pub struct PendingUrl {
    pub url: Url,
    pub referer: Option<Url>,
    pub recursion_level: u32,
    /// A page requisite (image, stylesheet, script) rather than an ordinary
    /// hyperlink — admitted under `page_requisites` even when `recursive` is
    /// off, and at the same depth as the page that referenced it (§4.4 step
    /// 4).
    pub is_requisite: bool,
    pub is_sitemap: bool,
}

/// The admission pipeline (§4.4): fingerprint dedup, host/domain scope,
/// parent-ascent, accept/reject patterns, then Host Registry lookup and
/// (for a brand-new Host) the synthetic robots Job. Called both for seed
/// URLs and for every child URL a worker's parser turns up, so recursion
/// never has to re-derive this chain at a second call site.
pub async fn admit(shared: &Shared, registry: &HostRegistry, pending: PendingUrl) -> bool {
    let PendingUrl { mut url, referer, recursion_level, is_requisite, is_sitemap } = pending;
    url.normalize_in_place();

    // HSTS upgrade happens before any other check: a host previously seen
    // over HTTPS with `Strict-Transport-Security` must never be dialed over
    // plain HTTP again, even if every other policy would otherwise admit it
    // (§8 scenario 4).
    if url.scheme() == "http" && shared.config.enable_hsts {
        if let Some(host) = url.host_str() {
            if shared.caches.hsts.should_upgrade(host) {
                let _ = url.set_scheme("https");
            }
        }
    }

    if url.scheme() != "https" && url.scheme() != "http" {
        return false;
    }
    if shared.config.https_only && url.scheme() != "https" {
        return false;
    }

    if !shared.fingerprints.insert_if_absent(&url) {
        return false;
    }

    if !is_requisite || shared.config.recursive {
        if !shared.filters.host_allowed(&url) {
            return false;
        }
        if !shared.filters.parent_allowed(&url) {
            return false;
        }
    }
    if !is_sitemap && !shared.filters.pattern_allowed(&url) {
        return false;
    }

    let Some(host_key) = HostKey::from_url(&url) else {
        return false;
    };

    let is_new_host = registry.get_or_create(&host_key).await;
    if is_new_host && !shared.config.ignore_robots {
        registry.mark_robots_pending(&host_key).await;
        if let Some(job) = robots::job_for(&host_key, &url) {
            registry.add_job(job).await;
        }
    }

    if !shared.config.ignore_robots && !registry.robots_allows(&host_key, &url).await {
        shared.exit_status.record(crate::error::Error::RobotsDisallowed.kind());
        return false;
    }

    let mut job = Job::seed(url, host_key);
    job.referer = referer;
    job.recursion_level = recursion_level;
    job.is_sitemap = is_sitemap;
    job.head_first = needs_probe(&shared.config, false);
    registry.add_job(job).await;
    true
}

/// Whether a Job needs a HEAD probe before its GET, evaluated at a single
/// call site rather than duplicated at every place a pattern is checked. A
/// probe is needed only when content-type must be known before policy can
/// decide: spider mode, chunk-size mode, or an accept/reject rule that
/// depends on content-type rather than the URL string alone.
pub fn needs_probe(config: &crate::config::Config, url_looks_ambiguous: bool) -> bool {
    config.spider || config.chunk_size_bytes.is_some() || url_looks_ambiguous
}
