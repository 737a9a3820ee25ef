//! Process-wide atomic counters (§4.10 / §5). Every worker updates these via
//! plain atomic adds; no lock is ever held across an increment.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub downloads: AtomicU64,
    pub redirects: AtomicU64,
    pub not_modified: AtomicU64,
    pub errors: AtomicU64,
    pub chunks: AtomicU64,
    pub total_bytes: AtomicU64,
    quota_used: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Snapshot {
    pub downloads: u64,
    pub redirects: u64,
    pub not_modified: u64,
    pub errors: u64,
    pub chunks: u64,
    pub total_bytes: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_download(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, bytes: u64) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_redirect(&self) {
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_modified(&self) {
        self.not_modified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reserve `bytes` against the quota, returning the new running total.
    /// This is a fetch-and-add: the caller must "reserve, then test" rather
    /// than test-then-reserve, so concurrent reservations can't both pass a
    /// check that's since become stale (§5).
    pub fn reserve_quota(&self, bytes: u64) -> u64 {
        self.quota_used.fetch_add(bytes, Ordering::SeqCst) + bytes
    }

    pub fn quota_used(&self) -> u64 {
        self.quota_used.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            downloads: self.downloads.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }

    /// Writes the final snapshot to `output.path` in `output.format`, once,
    /// at shutdown (§4.10 `--stats-site`/`--stats-tree`).
    pub fn write_output(&self, output: &crate::config::StatsOutput) -> std::io::Result<()> {
        let snapshot = self.snapshot();
        let rendered = match output.format {
            crate::config::StatsFormat::Json => {
                serde_json::to_string_pretty(&snapshot).expect("Snapshot serialization cannot fail")
            }
            crate::config::StatsFormat::Csv => format!(
                "downloads,redirects,not_modified,errors,chunks,total_bytes\n{},{},{},{},{},{}\n",
                snapshot.downloads,
                snapshot.redirects,
                snapshot.not_modified,
                snapshot.errors,
                snapshot.chunks,
                snapshot.total_bytes,
            ),
            crate::config::StatsFormat::Human => format!(
                "downloads: {}\nredirects: {}\nnot_modified: {}\nerrors: {}\nchunks: {}\ntotal_bytes: {}\n",
                snapshot.downloads,
                snapshot.redirects,
                snapshot.not_modified,
                snapshot.errors,
                snapshot.chunks,
                snapshot.total_bytes,
            ),
        };
        std::fs::write(&output.path, rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_output_renders_csv() {
        let stats = Stats::new();
        stats.record_download(100);
        stats.record_redirect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");
        stats
            .write_output(&crate::config::StatsOutput {
                format: crate::config::StatsFormat::Csv,
                path: path.clone(),
            })
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("downloads,redirects"));
        assert!(contents.contains("1,1,0,0,0,100"));
    }

    #[test]
    fn quota_reservation_is_fetch_and_add() {
        let stats = Stats::new();
        assert_eq!(stats.reserve_quota(100), 100);
        assert_eq!(stats.reserve_quota(50), 150);
        assert_eq!(stats.quota_used(), 150);
    }
}
