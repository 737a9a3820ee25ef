//! Protocol-state caches (§4.9): HSTS, HPKP, OCSP, and a TLS session-cache
//! placeholder. Each is a `dashmap`-backed concurrent map, consistent with
//! `FingerprintSet`'s choice of `dashmap` over a mutex-guarded `HashMap` for
//! the hot, high-cardinality tables.
//!
//! The core only stores and looks these up; it never validates a
//! certificate chain or parses an OCSP response itself (§9: those live
//! behind the `TlsPinValidator`/`OcspStore` traits so a real TLS backend can
//! plug in without the engine knowing its internals).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::{DashMap, DashSet};

/// A live HSTS entry: the host should be upgraded to `https://` until
/// `expires_at`.
#[derive(Debug, Clone, Copy)]
struct HstsEntry {
    expires_at: Instant,
    include_subdomains: bool,
}

#[derive(Default)]
pub struct HstsCache {
    entries: DashMap<String, HstsEntry>,
    dirty: AtomicBool,
}

impl HstsCache {
    /// Populates/refreshes an entry from a `Strict-Transport-Security`
    /// response header value. HTTPS-only and non-IP hosts are the caller's
    /// responsibility to enforce (§4.5 "Store cookies; update HSTS/HPKP
    /// caches (HTTPS only, non-IP hosts)").
    pub fn observe_header(&self, host: &str, header_value: &str) {
        let mut max_age = None;
        let mut include_subdomains = false;
        for directive in header_value.split(';') {
            let directive = directive.trim();
            if let Some(value) = directive.strip_prefix("max-age=") {
                max_age = value.trim().parse::<u64>().ok();
            } else if directive.eq_ignore_ascii_case("includeSubDomains") {
                include_subdomains = true;
            }
        }

        match max_age {
            Some(0) => {
                self.entries.remove(host);
            }
            Some(seconds) => {
                self.entries.insert(
                    host.to_string(),
                    HstsEntry {
                        expires_at: Instant::now() + Duration::from_secs(seconds),
                        include_subdomains,
                    },
                );
                self.dirty.store(true, Ordering::Relaxed);
            }
            None => {}
        }
    }

    /// Preloads an entry directly (used at startup from a persisted HSTS
    /// file, and by tests exercising the upgrade rule without a network).
    pub fn preload(&self, host: &str, ttl: Duration) {
        self.entries.insert(
            host.to_string(),
            HstsEntry {
                expires_at: Instant::now() + ttl,
                include_subdomains: false,
            },
        );
    }

    /// True if `host` (or, for a subdomain, some ancestor with
    /// `includeSubDomains`) currently has a live HSTS entry.
    pub fn should_upgrade(&self, host: &str) -> bool {
        if let Some(entry) = self.entries.get(host) {
            if entry.expires_at > Instant::now() {
                return true;
            }
        }

        let mut labels = host.split('.');
        labels.next();
        let mut ancestor = labels.collect::<Vec<_>>().join(".");
        while !ancestor.is_empty() {
            if let Some(entry) = self.entries.get(&ancestor) {
                if entry.expires_at > Instant::now() && entry.include_subdomains {
                    return true;
                }
            }
            let mut labels = ancestor.splitn(2, '.');
            labels.next();
            ancestor = labels.next().unwrap_or("").to_string();
        }

        false
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Loads entries persisted by a previous run (§4.9 "HSTS/HPKP caches
    /// persist across invocations"). Missing from `Instant`'s own epoch, so
    /// each line stores a wall-clock expiry that's converted back to an
    /// `Instant` relative to "now" on load. A missing file is not an error —
    /// the first run of a fresh `--hsts-file` path always starts empty.
    pub fn load_file(&self, path: &Path) -> std::io::Result<()> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let now_epoch = epoch_secs();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split('\t');
            let (Some(host), Some(expires_at), Some(include)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(expires_at) = expires_at.parse::<u64>() else { continue };
            if expires_at <= now_epoch {
                continue;
            }
            self.entries.insert(
                host.to_string(),
                HstsEntry {
                    expires_at: Instant::now() + Duration::from_secs(expires_at - now_epoch),
                    include_subdomains: include == "1",
                },
            );
        }
        Ok(())
    }

    /// Writes every still-live entry back out in the same format
    /// `load_file` reads, so a repeated run picks up where the last one
    /// left off.
    pub fn save_file(&self, path: &Path) -> std::io::Result<()> {
        let now_instant = Instant::now();
        let now_epoch = epoch_secs();
        let mut out = String::from("# host\texpires_at_epoch\tinclude_subdomains\n");
        for entry in self.entries.iter() {
            if entry.expires_at <= now_instant {
                continue;
            }
            let remaining = entry.expires_at.duration_since(now_instant).as_secs();
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                entry.key(),
                now_epoch + remaining,
                if entry.include_subdomains { 1 } else { 0 }
            ));
        }
        std::fs::write(path, out)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One pinned SPKI hash from a `Public-Key-Pins` header.
#[derive(Debug, Clone)]
pub struct Pin {
    pub algorithm: String,
    pub digest_b64: String,
}

#[derive(Default)]
pub struct HpkpCache {
    entries: DashMap<String, (Vec<Pin>, Instant)>,
    dirty: AtomicBool,
}

impl HpkpCache {
    pub fn observe_header(&self, host: &str, header_value: &str) {
        let mut pins = Vec::new();
        let mut max_age = None;

        for directive in header_value.split(';') {
            let directive = directive.trim();
            if let Some(value) = directive.strip_prefix("max-age=") {
                max_age = value.trim().parse::<u64>().ok();
            } else if let Some(value) = directive.strip_prefix("pin-sha256=") {
                let digest = value.trim().trim_matches('"');
                pins.push(Pin {
                    algorithm: "sha256".to_string(),
                    digest_b64: digest.to_string(),
                });
            }
        }

        if pins.is_empty() {
            return;
        }

        let ttl = Duration::from_secs(max_age.unwrap_or(0));
        self.entries.insert(host.to_string(), (pins, Instant::now() + ttl));
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn pins_for(&self, host: &str) -> Option<Vec<Pin>> {
        self.entries.get(host).and_then(|entry| {
            if entry.1 > Instant::now() {
                Some(entry.0.clone())
            } else {
                None
            }
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn load_file(&self, path: &Path) -> std::io::Result<()> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let now_epoch = epoch_secs();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split('\t');
            let (Some(host), Some(expires_at), Some(digests)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(expires_at) = expires_at.parse::<u64>() else { continue };
            if expires_at <= now_epoch {
                continue;
            }
            let pins: Vec<Pin> = digests
                .split(',')
                .filter(|d| !d.is_empty())
                .map(|d| Pin { algorithm: "sha256".to_string(), digest_b64: d.to_string() })
                .collect();
            if pins.is_empty() {
                continue;
            }
            self.entries.insert(
                host.to_string(),
                (pins, Instant::now() + Duration::from_secs(expires_at - now_epoch)),
            );
        }
        Ok(())
    }

    pub fn save_file(&self, path: &Path) -> std::io::Result<()> {
        let now_instant = Instant::now();
        let now_epoch = epoch_secs();
        let mut out = String::from("# host\texpires_at_epoch\tsha256_digests_comma_separated\n");
        for entry in self.entries.iter() {
            let (pins, expires_at) = entry.value();
            if *expires_at <= now_instant {
                continue;
            }
            let remaining = expires_at.duration_since(now_instant).as_secs();
            let digests = pins.iter().map(|p| p.digest_b64.as_str()).collect::<Vec<_>>().join(",");
            out.push_str(&format!("{}\t{}\t{}\n", entry.key(), now_epoch + remaining, digests));
        }
        std::fs::write(path, out)
    }
}

/// Validates a certificate chain against cached pins. The core never
/// implements certificate parsing; a real TLS backend implements this trait
/// against whatever chain representation it has.
pub trait TlsPinValidator: Send + Sync {
    fn validate_pins(&self, host: &str, spki_sha256_b64: &[String]) -> bool;
}

impl TlsPinValidator for HpkpCache {
    fn validate_pins(&self, host: &str, spki_sha256_b64: &[String]) -> bool {
        match self.pins_for(host) {
            Some(pins) => pins.iter().any(|pin| spki_sha256_b64.contains(&pin.digest_b64)),
            None => true,
        }
    }
}

/// Certificate serial → (revocation status, expiry). Opaque to the core: it
/// stores and serves lookups but never parses an OCSP response itself.
#[derive(Default)]
pub struct OcspCache {
    entries: DashMap<String, (bool, Instant)>,
}

impl OcspCache {
    pub fn record(&self, serial: &str, revoked: bool, ttl: Duration) {
        self.entries
            .insert(serial.to_string(), (revoked, Instant::now() + ttl));
    }

    pub fn is_revoked(&self, serial: &str) -> Option<bool> {
        self.entries.get(serial).and_then(|entry| {
            if entry.1 > Instant::now() {
                Some(entry.0)
            } else {
                None
            }
        })
    }
}

/// A process-lifetime home for the TLS backend's session-resumption table.
/// The core never reads or writes into it directly; it just keeps one
/// instance alive and hands it to the client builder, matching §4.9's "the
/// core's only responsibility is keeping one cache instance alive".
#[derive(Default)]
pub struct TlsSessionCache {
    known_hosts: DashSet<String>,
}

impl TlsSessionCache {
    pub fn note_established(&self, host_port: &str) {
        self.known_hosts.insert(host_port.to_string());
    }

    pub fn has_session(&self, host_port: &str) -> bool {
        self.known_hosts.contains(host_port)
    }
}

/// Bundles every protocol-state cache the crawler shares across workers.
#[derive(Default)]
pub struct ProtocolCaches {
    pub hsts: HstsCache,
    pub hpkp: HpkpCache,
    pub ocsp: OcspCache,
    pub tls_sessions: TlsSessionCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsts_upgrade_rule() {
        let hsts = HstsCache::default();
        assert!(!hsts.should_upgrade("a.com"));
        hsts.preload("a.com", Duration::from_secs(3600));
        assert!(hsts.should_upgrade("a.com"));
    }

    #[test]
    fn hsts_header_max_age_zero_clears_entry() {
        let hsts = HstsCache::default();
        hsts.preload("a.com", Duration::from_secs(3600));
        hsts.observe_header("a.com", "max-age=0");
        assert!(!hsts.should_upgrade("a.com"));
    }

    #[test]
    fn hpkp_validates_against_observed_pin() {
        let hpkp = HpkpCache::default();
        hpkp.observe_header("a.com", r#"max-age=3600; pin-sha256="abc123=""#);
        assert!(hpkp.validate_pins("a.com", &["abc123=".to_string()]));
        assert!(!hpkp.validate_pins("a.com", &["other=".to_string()]));
    }

    #[test]
    fn hpkp_absent_entry_allows_everything() {
        let hpkp = HpkpCache::default();
        assert!(hpkp.validate_pins("unknown.com", &[]));
    }
}
