//! One worker's request loop (§4.3): repeatedly asks its `HostRegistry` for
//! the next ready Job on whatever host it's currently assigned, sends the
//! request, runs the response through `pipeline`, and feeds the outcome
//! back into the registry and recursion logic. Kept deliberately thin —
//! header interpretation lives in `pipeline.rs`, so this loop only ever
//! matches on `PipelineOutcome` variants (§9 Design Notes).

use std::cell::Cell;
use std::io::Write as _;
use std::sync::atomic::Ordering;
use std::time::Instant;

use reqwest::Method;
use url::Url;

use crate::crawler::filename::SaveWriter;
use crate::crawler::host::{GetJobOutcome, HostRegistry};
use crate::crawler::multisource::MultiSourceJob;
use crate::crawler::pipeline::{Pipeline, PipelineOutcome};
use crate::crawler::sink::{BufferingSink, DatumSink};
use crate::crawler::{admit, filename, multisource, needs_probe, robots, AuthScheme, HostKey, Job, PendingUrl, Shared};
use crate::error::ErrorKind;
use crate::parsers::ContentKind;

/// What a finished Job should hand back to the caller's loop: zero or more
/// follow-up Jobs to enqueue (a redirect/auth retry, or an upgrade to
/// multi-part mode). Discovered child URLs are admitted directly by this
/// worker as soon as a body is saved, rather than threaded back through the
/// caller (§4.4 "Discovery").
pub struct WorkerOutcome {
    pub follow_up: Vec<Job>,
}

impl WorkerOutcome {
    fn none() -> Self {
        WorkerOutcome { follow_up: Vec::new() }
    }

    fn one(job: Job) -> Self {
        WorkerOutcome { follow_up: vec![job] }
    }
}

pub struct Worker<'a> {
    pub shared: &'a Shared,
    pub client: &'a reqwest::Client,
    pub host_key: HostKey,
    last_request: Cell<Instant>,
}

impl<'a> Worker<'a> {
    pub fn new(shared: &'a Shared, client: &'a reqwest::Client, host_key: HostKey) -> Self {
        Worker { shared, client, host_key, last_request: Cell::new(Instant::now()) }
    }
}

impl<'a> Worker<'a> {
    /// Runs the worker's loop against its assigned host until the registry
    /// reports nothing left for it, returning as soon as the queue empties
    /// rather than looping forever — the scheduler decides whether to
    /// reassign this worker elsewhere (§4.3 "worker pool sizing").
    pub async fn drain(&self, registry: &HostRegistry) {
        loop {
            if self.shared.terminate.load(Ordering::Relaxed) {
                return;
            }

            match registry.get_job(&self.host_key).await {
                GetJobOutcome::Job(job) => {
                    let wait = crate::crawler::pipeline::pace(
                        &self.shared.config,
                        registry.crawl_delay(&self.host_key).await,
                        self.last_request.get(),
                    );
                    if wait > std::time::Duration::ZERO {
                        tokio::time::sleep(wait).await;
                    }
                    self.last_request.set(Instant::now());

                    let outcome = self.run_job(job, registry).await;
                    for job in outcome.follow_up {
                        registry.add_job(job).await;
                    }
                }
                GetJobOutcome::WaitUntil(duration) => {
                    tokio::time::sleep(duration).await;
                }
                GetJobOutcome::None => return,
            }
        }
    }

    /// Executes one Job: HEAD probe if needed, GET (or, for a Job already in
    /// multi-part mode, the chunked/mirror retrieval loop), then response
    /// interpretation and recursion. Discovery admission for URLs found
    /// inside a saved body happens here too, once the body is on disk
    /// (§4.4 step 5 only ever runs from `crawler::admit`, but every call
    /// site to it lives in this file or in `scheduler.rs`'s seeding).
    async fn run_job(&self, mut job: Job, registry: &HostRegistry) -> WorkerOutcome {
        if job.is_multipart() {
            return self.fetch_multipart(job, registry).await;
        }

        let probe_first = job.head_first || needs_probe(&self.shared.config, false);

        if probe_first && !job.is_robots {
            match self.probe(&job).await {
                ProbeResult::SwitchToMultipart(metalink) => {
                    job.metalink = Some(metalink.clone());
                    job.parts = MultiSourceJob::init_parts(&metalink);
                    return self.fetch_multipart(job, registry).await;
                }
                ProbeResult::Fail(kind) => {
                    self.shared.exit_status.record(kind);
                    self.shared.stats.record_error();
                    registry.increase_failure(&self.host_key).await;
                    return WorkerOutcome::none();
                }
                ProbeResult::SkipBody => {
                    registry.reset_failure(&self.host_key).await;
                    return WorkerOutcome::none();
                }
                ProbeResult::Continue(content_type) => {
                    // `--spider` never GETs a body (§8 scenario 2): a HEAD
                    // alone can't reveal the links inside a page, so a
                    // recursable content-type gets exactly one
                    // discovery-only GET whose body is parsed and
                    // discarded, never saved or counted as a download.
                    if self.shared.config.spider {
                        registry.reset_failure(&self.host_key).await;
                        self.discover_from_head(&job, content_type.as_deref(), registry).await;
                        return WorkerOutcome::none();
                    }
                }
            }
        }

        self.fetch_and_process(job, registry).await
    }

    async fn probe(&self, job: &Job) -> ProbeResult {
        let mut request = self.client.request(Method::HEAD, job.target.clone());
        request = self.attach_auth(request, job, &Method::HEAD, &job.target);

        let response = match request.send().await {
            Ok(response) => response,
            Err(_) => return ProbeResult::Continue(None),
        };

        let pipeline = Pipeline {
            config: &self.shared.config,
            etags: &self.shared.etags,
            caches: &self.shared.caches,
        };

        match pipeline.interpret_head(job, &response) {
            PipelineOutcome::DescribedBy { metalink } => ProbeResult::SwitchToMultipart(metalink),
            PipelineOutcome::Fail(e) => ProbeResult::Fail(e.kind()),
            PipelineOutcome::SkipBody => ProbeResult::SkipBody,
            PipelineOutcome::Saved { content_type, .. } => ProbeResult::Continue(content_type),
            _ => ProbeResult::Continue(None),
        }
    }

    /// The HEAD-only discovery path for `--spider` (§4.4/§8 scenario 2):
    /// reads and parses a body purely to surface child links, without ever
    /// handing it to `recurse`'s save-path machinery. No file is written, no
    /// download is recorded, and conversion offsets are never collected for
    /// a document that doesn't exist on disk.
    async fn discover_from_head(&self, job: &Job, content_type: Option<&str>, registry: &HostRegistry) {
        if job.is_robots || !self.recursion_allowed(job) {
            return;
        }

        let Some(kind) = ContentKind::classify(content_type, &job.target) else {
            return;
        };
        if !matches!(
            kind,
            ContentKind::Html | ContentKind::Css | ContentKind::Feed | ContentKind::Sitemap
        ) {
            return;
        }

        let mut request = self.client.request(Method::GET, job.target.clone());
        request = self.attach_auth(request, job, &Method::GET, &job.target);
        let Ok(response) = request.send().await else { return };
        if !response.status().is_success() {
            return;
        }
        let Ok(body) = response.bytes().await else { return };

        self.discover_children(job, None, &body, kind, registry).await;
    }

    async fn fetch_and_process(&self, job: Job, registry: &HostRegistry) -> WorkerOutcome {
        let mut request = self.client.request(Method::GET, job.target.clone());
        request = self.attach_auth(request, &job, &Method::GET, &job.target);
        if let Some(referer) = &job.referer {
            request = request.header(reqwest::header::REFERER, referer.as_str());
        }
        if let Some(etag) = self.shared.etags.get(&job.target) {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        for header in &self.shared.config.headers {
            if let Some((name, value)) = header.split_once(':') {
                if let (Ok(name), Ok(value)) = (
                    reqwest::header::HeaderName::from_bytes(name.trim().as_bytes()),
                    reqwest::header::HeaderValue::from_str(value.trim()),
                ) {
                    request = request.header(name, value);
                }
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.shared.exit_status.record(crate::error::Error::from(e).kind());
                self.shared.stats.record_error();
                registry.increase_failure(&self.host_key).await;
                return WorkerOutcome::none();
            }
        };

        let pipeline = Pipeline {
            config: &self.shared.config,
            etags: &self.shared.etags,
            caches: &self.shared.caches,
        };

        match pipeline.interpret_get(&job, response).await {
            PipelineOutcome::Saved { .. } => {
                // `interpret_get` never actually produces this variant (it's
                // `interpret_head`'s "nothing to act on" signal); kept as a
                // reachable arm only because both functions share one enum.
                registry.reset_failure(&self.host_key).await;
                WorkerOutcome::none()
            }
            PipelineOutcome::SkipBody => {
                registry.reset_failure(&self.host_key).await;
                WorkerOutcome::none()
            }
            PipelineOutcome::Stream { mut response, content_type } => {
                registry.reset_failure(&self.host_key).await;

                // A Metalink/HTTP *descriptor* body (as opposed to the final
                // content) switches the Job into multi-part mode instead of
                // being saved as-is (§4.5 "Metalink/HTTP discovery"); it's
                // small and control-plane only, so it's fine to read fully
                // into memory rather than stream to disk.
                if content_type.as_deref().map(|c| c.contains("metalink")).unwrap_or(false) {
                    let body = match response.bytes().await {
                        Ok(body) => body,
                        Err(e) => {
                            self.shared.exit_status.record(crate::error::Error::from(e).kind());
                            return WorkerOutcome::none();
                        }
                    };
                    if let Some(metalink) = crate::parsers::metalink::parse(&body) {
                        let mut retry = job.clone();
                        retry.parts = MultiSourceJob::init_parts(&metalink);
                        retry.metalink = Some(metalink);
                        return WorkerOutcome::one(retry);
                    }
                    return WorkerOutcome::none();
                }

                let local_path = filename::derive(&job.target, &self.shared.config);
                let resolved = match SaveWriter::prepare(&local_path, &self.shared.config) {
                    Ok(path) => path,
                    Err(e) => {
                        self.shared.exit_status.record(crate::error::Error::from(e).kind());
                        return WorkerOutcome::none();
                    }
                };
                let mut file = match std::fs::File::create(&resolved) {
                    Ok(file) => file,
                    Err(e) => {
                        self.shared.exit_status.record(crate::error::Error::from(e).kind());
                        return WorkerOutcome::none();
                    }
                };

                // The disk write takes the whole body, however large; only
                // `sink` (the parser-input mirror) is capped at
                // `max_in_memory_response_bytes` (§4.9, REDESIGN FLAGS).
                let mut sink = BufferingSink::new(self.shared.config.max_in_memory_response_bytes);
                sink.on_header(response.content_length());

                let mut total = 0u64;
                let mut quota_hit = false;
                loop {
                    match response.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = file.write_all(&chunk) {
                                self.shared.exit_status.record(crate::error::Error::from(e).kind());
                                return WorkerOutcome::none();
                            }
                            sink.on_chunk(&chunk);
                            total += chunk.len() as u64;
                            if self.quota_exceeded(chunk.len() as u64) {
                                quota_hit = true;
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            self.shared.exit_status.record(crate::error::Error::from(e).kind());
                            return WorkerOutcome::none();
                        }
                    }
                }
                drop(file);

                self.shared.stats.record_download(total);
                self.shared.saved_urls.insert(job.target.as_str().to_string());
                self.write_xattrs(&resolved, &job, content_type.as_deref());

                if quota_hit {
                    return WorkerOutcome::none();
                }

                let body = sink.finish();
                self.recurse(&job, Some(&resolved), &body, content_type.as_deref(), registry).await;

                WorkerOutcome::none()
            }
            PipelineOutcome::NotModified => {
                self.shared.stats.record_not_modified();
                registry.reset_failure(&self.host_key).await;
                if self.shared.config.timestamping {
                    let local_path = filename::derive(&job.target, &self.shared.config);
                    if let Ok(body) = std::fs::read(&local_path) {
                        self.recurse(&job, Some(&local_path), &body, None, registry).await;
                    }
                }
                WorkerOutcome::none()
            }
            PipelineOutcome::Redirect { location } => {
                self.shared.stats.record_redirect();
                match HostKey::from_url(&location) {
                    Some(host_key) => WorkerOutcome::one(job.redirected(location, host_key)),
                    None => WorkerOutcome::none(),
                }
            }
            PipelineOutcome::AuthChallenge { scheme, is_proxy } => {
                let mut retry = job.clone();
                if is_proxy {
                    retry.proxy_challenge = Some(scheme);
                } else {
                    retry.server_challenge = Some(scheme);
                }
                WorkerOutcome::one(retry)
            }
            PipelineOutcome::DescribedBy { metalink } => {
                let mut retry = job.clone();
                retry.metalink = Some(metalink.clone());
                retry.parts = MultiSourceJob::init_parts(&metalink);
                WorkerOutcome::one(retry)
            }
            PipelineOutcome::Fail(e) => {
                self.shared.exit_status.record(e.kind());
                self.shared.stats.record_error();
                registry.increase_failure(&self.host_key).await;
                WorkerOutcome::none()
            }
        }
    }

    /// Content-type dispatch and recursion for a successfully saved (or, for
    /// a timestamped 304, reparsed) body (§4.5 "Full responses"). A robots
    /// Job never reaches the `ContentKind` dispatch below — it's parsed by
    /// `robots::apply` instead, which also resolves the sitemap Jobs it
    /// names. `local_path` is `None` for a discovery-only read (`--spider`'s
    /// HEAD-time path) that never touched disk, in which case conversion
    /// offsets simply aren't recorded for it.
    async fn recurse(
        &self,
        job: &Job,
        local_path: Option<&std::path::Path>,
        body: &[u8],
        content_type: Option<&str>,
        registry: &HostRegistry,
    ) {
        if job.is_robots {
            let text = String::from_utf8_lossy(body);
            let sitemaps = robots::apply(
                registry,
                &job.host_key,
                &self.shared.config.user_agent.full,
                self.shared.config.ignore_robots,
                200,
                Some(&text),
            )
            .await;
            for sitemap_url in sitemaps {
                let pending = PendingUrl {
                    url: sitemap_url,
                    referer: Some(job.target.clone()),
                    recursion_level: job.recursion_level,
                    is_requisite: false,
                    is_sitemap: true,
                };
                admit(self.shared, registry, pending).await;
            }
            return;
        }

        if !self.recursion_allowed(job) {
            return;
        }

        let Some(kind) = ContentKind::classify(content_type, &job.target) else {
            return;
        };

        self.discover_children(job, local_path, body, kind, registry).await;
    }

    /// Whether a Job's recursion level and the run's `--recursive`/`--level`
    /// policy permit discovering children at all — shared by the normal
    /// GET-save path and `--spider`'s HEAD-time discovery path so the two
    /// never drift apart.
    fn recursion_allowed(&self, job: &Job) -> bool {
        if !self.shared.config.recursive && !job.is_sitemap {
            return false;
        }
        if job.recursion_level >= self.shared.config.level && !job.is_sitemap {
            return false;
        }
        true
    }

    /// Parses `body` as `kind` and admits every link it names. Shared by
    /// `recurse` (body already on disk at `local_path`) and
    /// `discover_from_head` (`local_path: None`, body never saved).
    async fn discover_children(
        &self,
        job: &Job,
        local_path: Option<&std::path::Path>,
        body: &[u8],
        kind: ContentKind,
        registry: &HostRegistry,
    ) {
        match kind {
            ContentKind::Html => {
                let text = String::from_utf8_lossy(body);
                let doc = crate::parsers::html::parse(&text, &job.target);

                if let Some(local_path) = local_path {
                    if self.shared.config.convert_links {
                        let links: Vec<_> = doc.discovered.iter().filter_map(|d| d.offset.clone()).collect();
                        self.shared.conversions.record(local_path.to_path_buf(), links);
                    }
                }

                for discovered in doc.discovered {
                    if discovered.is_requisite && !self.shared.config.page_requisites {
                        continue;
                    }
                    let pending = PendingUrl {
                        url: discovered.url,
                        referer: Some(job.target.clone()),
                        recursion_level: job.recursion_level + 1,
                        is_requisite: discovered.is_requisite,
                        is_sitemap: false,
                    };
                    admit(self.shared, registry, pending).await;
                }
            }
            ContentKind::Css => {
                let text = String::from_utf8_lossy(body);
                let doc = crate::parsers::css::parse(&text, &job.target);

                if let Some(local_path) = local_path {
                    if self.shared.config.convert_links {
                        let links: Vec<_> = doc.discovered.iter().filter_map(|d| d.offset.clone()).collect();
                        self.shared.conversions.record(local_path.to_path_buf(), links);
                    }
                }

                for discovered in doc.discovered {
                    let pending = PendingUrl {
                        url: discovered.url,
                        referer: Some(job.target.clone()),
                        recursion_level: job.recursion_level + 1,
                        is_requisite: true,
                        is_sitemap: false,
                    };
                    admit(self.shared, registry, pending).await;
                }
            }
            ContentKind::Feed => {
                for url in crate::parsers::feed::parse(body, &job.target) {
                    let pending = PendingUrl {
                        url,
                        referer: Some(job.target.clone()),
                        recursion_level: job.recursion_level + 1,
                        is_requisite: false,
                        is_sitemap: false,
                    };
                    admit(self.shared, registry, pending).await;
                }
            }
            ContentKind::Sitemap => {
                for entry in crate::parsers::sitemap::parse(body) {
                    let url = match entry {
                        crate::parsers::sitemap::SitemapEntry::Url(dated) => dated.url,
                        crate::parsers::sitemap::SitemapEntry::Sitemap(url) => url,
                    };
                    let pending = PendingUrl {
                        url,
                        referer: Some(job.target.clone()),
                        recursion_level: job.recursion_level,
                        is_requisite: false,
                        is_sitemap: true,
                    };
                    admit(self.shared, registry, pending).await;
                }
            }
            ContentKind::Metalink => {}
        }
    }

    /// Drives the multi-source/chunked retrieval loop for a Job already in
    /// multi-part mode (§4.5 "Part responses", §8 "Round-trip of
    /// Metalink"): claims each part in turn, fetches it by `Range` from the
    /// highest-priority mirror, and assembles + checksum-validates the
    /// whole file once every part is done.
    async fn fetch_multipart(&self, mut job: Job, registry: &HostRegistry) -> WorkerOutcome {
        let local_path = filename::derive(&job.target, &self.shared.config);
        if let Err(e) = SaveWriter::prepare(&local_path, &self.shared.config) {
            self.shared.exit_status.record(crate::error::Error::from(e).kind());
            return WorkerOutcome::none();
        }

        let mut failed_mirrors: Vec<usize> = Vec::new();

        loop {
            let part_id = {
                let mut ms = match MultiSourceJob::new(&mut job) {
                    Some(ms) => ms,
                    None => break,
                };
                if ms.all_done() {
                    break;
                }
                match ms.claim_next() {
                    Some(part) => part.id,
                    None => break,
                }
            };

            let total_mirrors = job.metalink.as_ref().unwrap().mirrors.len();
            let (position, length) = {
                let part = job.parts.iter().find(|p| p.id == part_id).unwrap();
                (part.position, part.length)
            };
            let selected_mirror_url: Option<Url> = {
                let ms = MultiSourceJob::new(&mut job).unwrap();
                ms.select_mirror(&failed_mirrors).map(|m| m.url.clone())
            };
            let mirror_url = selected_mirror_url.clone().unwrap_or_else(|| job.target.clone());
            let mirror_index = selected_mirror_url
                .and_then(|url| job.metalink.as_ref().unwrap().mirrors.iter().position(|m| m.url == url))
                .unwrap_or(0);

            let range = format!("bytes={}-{}", position, position + length.saturating_sub(1));
            let mut request = self.client.request(Method::GET, mirror_url.clone());
            request = request.header(reqwest::header::RANGE, range);
            request = self.attach_auth(request, &job, &Method::GET, &mirror_url);

            let fetched = match request.send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(body) if body.len() as u64 == length => Some(body),
                    _ => None,
                },
                _ => None,
            };

            let mut ms = MultiSourceJob::new(&mut job).unwrap();
            match fetched {
                Some(body) => {
                    let part_path = multisource::part_path(&local_path, part_id);
                    if std::fs::write(&part_path, &body).is_err() {
                        ms.release(part_id);
                        registry.increase_failure(&self.host_key).await;
                        break;
                    }
                    ms.complete(part_id);
                    self.shared.stats.record_chunk(length);
                }
                None => {
                    ms.release(part_id);
                    // Exclude the mirror that just failed from the next
                    // part's selection; once every mirror has failed once
                    // this round, give them all another chance rather than
                    // stalling forever on a single-mirror descriptor.
                    if failed_mirrors.len() + 1 >= total_mirrors {
                        failed_mirrors.clear();
                    } else if !failed_mirrors.contains(&mirror_index) {
                        failed_mirrors.push(mirror_index);
                    }
                    if registry.increase_failure(&self.host_key).await {
                        self.shared.exit_status.record(ErrorKind::Network);
                        break;
                    }
                    continue;
                }
            }
        }

        if !job.all_parts_done() {
            return WorkerOutcome::one(job);
        }

        let metalink = job.metalink.clone().unwrap();
        match multisource::assemble(&local_path, &metalink) {
            Ok(()) => {
                registry.reset_failure(&self.host_key).await;
                let total: u64 = metalink.pieces.iter().map(|p| p.length).sum();
                self.shared.stats.record_download(total);
            }
            Err(e) => {
                tracing::warn!(file = %metalink.file_name, "checksum validation failed, discarding");
                let _ = std::fs::remove_file(&local_path);
                self.shared.exit_status.record(e.kind());
                self.shared.stats.record_error();
            }
        }

        WorkerOutcome::none()
    }

    fn quota_exceeded(&self, additional_bytes: u64) -> bool {
        let reserved = self.shared.stats.reserve_quota(additional_bytes);
        if let Some(quota) = self.shared.config.quota_bytes {
            if reserved > quota {
                self.shared.exit_status.record(ErrorKind::Quota);
                self.shared.terminate.store(true, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    #[cfg(unix)]
    fn write_xattrs(&self, path: &std::path::Path, job: &Job, content_type: Option<&str>) {
        if !self.shared.config.xattr {
            return;
        }
        let _ = xattr::set(path, "user.xdg.origin.url", job.target.as_str().as_bytes());
        if let Some(referer) = &job.referer {
            let _ = xattr::set(path, "user.xdg.referrer.url", referer.as_str().as_bytes());
        }
        if let Some(content_type) = content_type {
            let _ = xattr::set(path, "user.mime_type", content_type.as_bytes());
        }
    }

    #[cfg(not(unix))]
    fn write_xattrs(&self, _path: &std::path::Path, _job: &Job, _content_type: Option<&str>) {}

    /// Attaches `Authorization` once a prior 401 has cached a challenge on
    /// the Job (§4.5: auth is only ever sent in response to a challenge, never
    /// preemptively), picking Digest over Basic when both the config and the
    /// challenge allow it (§6 "strongest supported challenge").
    fn attach_auth(
        &self,
        request: reqwest::RequestBuilder,
        job: &Job,
        method: &Method,
        url: &Url,
    ) -> reqwest::RequestBuilder {
        let Some(user) = &self.shared.config.user else {
            return request;
        };
        match &job.server_challenge {
            Some(AuthScheme::Basic) => request.basic_auth(user, self.shared.config.password.clone()),
            Some(AuthScheme::Digest { realm, nonce }) => {
                let password = self.shared.config.password.clone().unwrap_or_default();
                let value = digest_authorization(method.as_str(), url.path(), user, &password, realm, nonce);
                request.header(reqwest::header::AUTHORIZATION, value)
            }
            None => request,
        }
    }
}

/// RFC 2069-style Digest response (no `qop`/`cnonce`, matching the fields
/// `AuthScheme::Digest` actually carries): `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`.
fn digest_authorization(method: &str, uri: &str, user: &str, password: &str, realm: &str, nonce: &str) -> String {
    let ha1 = format!("{:x}", md5::compute(format!("{user}:{realm}:{password}")));
    let ha2 = format!("{:x}", md5::compute(format!("{method}:{uri}")));
    let response = format!("{:x}", md5::compute(format!("{ha1}:{nonce}:{ha2}")));
    format!(r#"Digest username="{user}", realm="{realm}", nonce="{nonce}", uri="{uri}", response="{response}""#)
}

enum ProbeResult {
    /// Proceed to GET; carries the probed content-type when the HEAD
    /// response had one, so `--spider` discovery doesn't have to re-probe.
    Continue(Option<String>),
    /// The HEAD response's content-type is outside the allow-list (§4.5):
    /// no GET follows at all, probed or not.
    SkipBody,
    SwitchToMultipart(crate::crawler::Metalink),
    Fail(ErrorKind),
}
