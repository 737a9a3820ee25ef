//! Small extension trait over [`url::Url`] used throughout admission,
//! scheduling, and the parent-rule filter.
//!
//! `root_domain`/`icann_domain` use a compact table of known multi-label
//! public suffixes rather than a vendored public suffix list: this covers the
//! common cases (`co.uk`, `com.au`, ...) without shipping a data file the
//! core has no way to keep current. See `DESIGN.md` for the tradeoff.

use url::Url;

const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "gov.uk", "ac.uk", "co.jp", "co.nz", "com.au", "net.au", "org.au",
    "com.br", "co.kr", "co.in", "co.za", "com.cn", "com.mx",
];

pub trait UrlExt {
    fn parse_with_base(base: &Url, href: &str) -> crate::error::Result<Url>;
    fn root_domain(&self) -> Option<&str>;
    fn normalized_host(&self) -> Option<&str>;
    fn normalize_in_place(&mut self);
    fn is_homepage(&self) -> bool;
    fn directory_prefix(&self) -> &str;
    fn is_under_parent(&self, seed_prefix: &str) -> bool;
}

impl UrlExt for Url {
    fn parse_with_base(base: &Url, href: &str) -> crate::error::Result<Url> {
        match Url::parse(href) {
            Ok(url) => Ok(url),
            Err(_) => Ok(base.join(href)?),
        }
    }

    fn root_domain(&self) -> Option<&str> {
        let host = self.host_str()?;

        for suffix in MULTI_LABEL_SUFFIXES {
            if let Some(prefix) = host.strip_suffix(suffix) {
                let prefix = prefix.strip_suffix('.')?;
                if let Some(idx) = prefix.rfind('.') {
                    return Some(&host[idx + 1..]);
                }
                return Some(host);
            }
        }

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() <= 2 {
            return Some(host);
        }

        let tail = &labels[labels.len() - 2..];
        let offset = host.len() - tail[0].len() - 1 - tail[1].len();
        Some(&host[offset..])
    }

    fn normalized_host(&self) -> Option<&str> {
        self.host_str().map(|h| h.trim_start_matches("www."))
    }

    fn normalize_in_place(&mut self) {
        self.set_fragment(None);

        if !self.username().is_empty() {
            let _ = self.set_username("");
        }

        if self.password().is_some() {
            let _ = self.set_password(None);
        }
    }

    fn is_homepage(&self) -> bool {
        self.path() == "/" && self.query().is_none()
    }

    /// The path prefix used by the parent-ascent (`--no-parent`) rule: the
    /// path up to and including the last `/`.
    fn directory_prefix(&self) -> &str {
        let path = self.path();
        match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        }
    }

    fn is_under_parent(&self, seed_prefix: &str) -> bool {
        self.path().starts_with(seed_prefix)
    }
}
