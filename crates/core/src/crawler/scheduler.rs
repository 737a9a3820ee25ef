//! The top-level coordinator (§4.1/§4.3): seeds the Host Registry from the
//! configured starting URLs, spawns and rebalances the worker pool across
//! hosts, watches for quiescence, and handles SIGINT/SIGTERM. Everything
//! else in `crawler` is a collaborator this type wires together; `main.rs`
//! only ever touches `Retriever`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashSet;
use tokio::sync::Notify;
use url::Url;

use crate::config::Config;
use crate::crawler::filters::Filters;
use crate::crawler::host::HostRegistry;
use crate::crawler::worker::Worker;
use crate::crawler::{admit, caches, client, conversion, pipeline, HostKey, PendingUrl, Shared};
use crate::error::{Error, ExitStatus, Result};
use crate::fingerprint::FingerprintSet;
use crate::stats::Stats;

/// The whole retrieval run. Built once from a resolved `Config`, then
/// driven to completion by `run`.
pub struct Retriever {
    shared: Shared,
    registry: Arc<HostRegistry>,
    reqwest_client: reqwest::Client,
    seeds: Vec<Url>,
}

impl Retriever {
    pub fn new(config: Config) -> Result<Self> {
        let seeds = resolve_seeds(&config)?;
        let filters = Filters::compile(&config, &seeds)?;
        let reqwest_client = client::build(&config)?;

        let shared = Shared {
            config: Arc::new(config),
            stats: Arc::new(Stats::new()),
            exit_status: Arc::new(ExitStatus::new()),
            fingerprints: Arc::new(FingerprintSet::default()),
            conversions: Arc::new(conversion::ConversionRecorder::default()),
            caches: Arc::new(caches::ProtocolCaches::default()),
            etags: Arc::new(pipeline::EtagCache::default()),
            terminate: Arc::new(AtomicBool::new(false)),
            abort_now: Arc::new(AtomicBool::new(false)),
            filters: Arc::new(filters),
            saved_urls: Arc::new(dashmap::DashSet::new()),
        };

        let registry = Arc::new(HostRegistry::new(
            shared.config.tries,
            std::time::Duration::from_millis(shared.config.waitretry_ms),
        ));

        load_protocol_caches(&shared);

        Ok(Retriever { shared, registry, reqwest_client, seeds })
    }

    /// Runs the whole retrieval to completion (or until interrupted),
    /// returning once every Job has settled and no worker has anything left
    /// to claim.
    pub async fn run(&self) -> Result<()> {
        let registry = &self.registry;

        for seed in &self.seeds {
            let pending = PendingUrl {
                url: seed.clone(),
                referer: None,
                recursion_level: 0,
                is_requisite: false,
                is_sitemap: false,
            };
            admit(&self.shared, registry, pending).await;
        }

        let active_workers = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let worker_cap = self.shared.config.num_worker_threads.max(1);

        let exit_status = self.shared.exit_status.clone();
        let interrupt = self.shared.terminate.clone();
        let abort_now = self.shared.abort_now.clone();
        tokio::spawn(async move {
            let mut sigint_count = 0u32;
            #[cfg(unix)]
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

            loop {
                #[cfg(unix)]
                let fired_sigterm = async {
                    match sigterm.as_mut() {
                        Some(stream) => {
                            stream.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                #[cfg(not(unix))]
                let fired_sigterm = std::future::pending::<()>();

                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_err() {
                            break;
                        }
                        sigint_count += 1;
                        if sigint_count == 1 {
                            tracing::warn!("interrupt received, finishing in-flight requests and stopping");
                            exit_status.record(crate::error::ErrorKind::Signal);
                            interrupt.store(true, Ordering::Relaxed);
                        } else {
                            tracing::warn!("second interrupt received, aborting immediately");
                            abort_now.store(true, Ordering::Relaxed);
                            interrupt.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                    _ = fired_sigterm => {
                        tracing::warn!("SIGTERM received, aborting immediately");
                        exit_status.record(crate::error::ErrorKind::Signal);
                        abort_now.store(true, Ordering::Relaxed);
                        interrupt.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        });

        let mut handles: Vec<(HostKey, tokio::task::JoinHandle<()>)> = Vec::new();

        loop {
            if self.shared.terminate.load(Ordering::Relaxed) {
                break;
            }

            handles.retain(|(_, h)| !h.is_finished());
            let busy: HashSet<HostKey> = handles.iter().map(|(key, _)| key.clone()).collect();

            if handles.len() < worker_cap {
                if let Some(host_key) = registry.claim_host_with_work(&busy).await {
                    let shared = self.shared.clone();
                    let client = self.reqwest_client.clone();
                    let registry = registry.clone();
                    let active_workers = active_workers.clone();
                    let notify = notify.clone();
                    let key_for_task = host_key.clone();

                    active_workers.fetch_add(1, Ordering::SeqCst);
                    handles.push((
                        host_key,
                        tokio::spawn(async move {
                            let worker = Worker::new(&shared, &client, key_for_task);
                            worker.drain(&registry).await;
                            active_workers.fetch_sub(1, Ordering::SeqCst);
                            notify.notify_one();
                        }),
                    ));
                    continue;
                }
            }

            if registry.all_idle().await && active_workers.load(Ordering::SeqCst) == 0 {
                break;
            }

            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
        }

        if self.shared.abort_now.load(Ordering::Relaxed) {
            for (_, handle) in handles {
                handle.abort();
            }
        } else {
            for (_, handle) in handles {
                let _ = handle.await;
            }
        }

        self.finish_conversions()?;
        save_protocol_caches(&self.shared);

        if let Some(output) = &self.shared.config.stats_output {
            if let Err(e) = self.shared.stats.write_output(output) {
                tracing::warn!("failed to write stats to {}: {e}", output.path.display());
            }
        }

        Ok(())
    }

    fn finish_conversions(&self) -> Result<()> {
        if !self.shared.config.convert_links || self.shared.conversions.is_empty() {
            return Ok(());
        }

        let config = &self.shared.config;
        let saved_urls = &self.shared.saved_urls;
        self.shared.conversions.finish(config.backup_converted, |url| {
            let mut normalized = url.clone();
            normalized.normalize_in_place();
            if !saved_urls.contains(normalized.as_str()) {
                return None;
            }
            Some(crate::crawler::filename::derive(&normalized, config))
        })?;

        Ok(())
    }

    pub fn exit_code(&self) -> i32 {
        self.shared.exit_status.code()
    }

    pub fn stats(&self) -> crate::stats::Snapshot {
        self.shared.stats.snapshot()
    }
}

/// Loads any HSTS/HPKP state persisted by a previous run (§4.9), so a
/// `--hsts-file`/`--hpkp-file` path carries upgrade/pin decisions across
/// invocations rather than just within one.
fn load_protocol_caches(shared: &Shared) {
    if shared.config.enable_hsts {
        if let Some(path) = &shared.config.hsts_file {
            if let Err(e) = shared.caches.hsts.load_file(path) {
                tracing::warn!("failed to load HSTS cache from {}: {e}", path.display());
            }
        }
    }
    if shared.config.enable_hpkp {
        if let Some(path) = &shared.config.hpkp_file {
            if let Err(e) = shared.caches.hpkp.load_file(path) {
                tracing::warn!("failed to load HPKP cache from {}: {e}", path.display());
            }
        }
    }
}

/// Persists HSTS/HPKP state back out at shutdown, only rewriting a cache
/// that actually changed this run.
fn save_protocol_caches(shared: &Shared) {
    if shared.config.enable_hsts && shared.caches.hsts.is_dirty() {
        if let Some(path) = &shared.config.hsts_file {
            if let Err(e) = shared.caches.hsts.save_file(path) {
                tracing::warn!("failed to save HSTS cache to {}: {e}", path.display());
            }
        }
    }
    if shared.config.enable_hpkp && shared.caches.hpkp.is_dirty() {
        if let Some(path) = &shared.config.hpkp_file {
            if let Err(e) = shared.caches.hpkp.save_file(path) {
                tracing::warn!("failed to save HPKP cache to {}: {e}", path.display());
            }
        }
    }
}

/// Resolves `--input-file`/positional seed strings into parsed URLs,
/// rejecting the run outright (rather than skipping silently) if not a
/// single seed parses, since a run with zero seeds can never terminate
/// usefully (§4.1 "Startup").
fn resolve_seeds(config: &Config) -> Result<Vec<Url>> {
    let mut raw: Vec<String> = config.seeds.clone();

    if let Some(path) = &config.input_file {
        let contents = std::fs::read_to_string(path)?;
        raw.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
    }

    let mut seeds = Vec::new();
    for entry in raw {
        match Url::parse(&entry) {
            Ok(url) => seeds.push(url),
            Err(_) => return Err(Error::Startup(format!("invalid seed URL: {entry}"))),
        }
    }

    if seeds.is_empty() {
        return Err(Error::Startup("no seed URLs given".to_string()));
    }

    Ok(seeds)
}
