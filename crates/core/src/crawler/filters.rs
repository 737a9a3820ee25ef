//! Policy filters (§4.8): accept/reject glob-or-suffix pattern lists,
//! accept/reject regexes, host/domain scope rules, and the parent-ascent
//! rule. Compiled once from `Config` at `Retriever::new` time and shared
//! read-only, the same way `filename::Namer` and `client::build` are
//! compiled once and handed to every worker.

use globset::Glob;
use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::url_ext::UrlExt;

/// A single compiled pattern: a glob if the text contains `*?[]`, else a
/// plain suffix match. Kept as two explicit variants rather than compiling
/// everything as a glob, since a config file written against suffix
/// semantics (`--accept=.pdf`) would otherwise silently change meaning.
enum PatternRule {
    Glob(globset::GlobMatcher),
    Suffix(String),
}

impl PatternRule {
    fn compile(raw: &str) -> Result<Self> {
        if raw.contains(['*', '?', '[']) {
            let glob = Glob::new(raw)
                .map_err(|e| Error::Config(format!("invalid glob pattern {raw:?}: {e}")))?;
            Ok(PatternRule::Glob(glob.compile_matcher()))
        } else {
            Ok(PatternRule::Suffix(raw.to_ascii_lowercase()))
        }
    }

    fn matches(&self, filename: &str) -> bool {
        match self {
            PatternRule::Glob(matcher) => matcher.is_match(filename),
            PatternRule::Suffix(suffix) => filename.to_ascii_lowercase().ends_with(suffix.as_str()),
        }
    }
}

/// A compiled accept/reject pattern list. `in_pattern_list` short-circuits
/// on first match, matching §4.8.
struct PatternList(Vec<PatternRule>);

impl PatternList {
    fn compile(raw: &[String]) -> Result<Self> {
        raw.iter().map(|p| PatternRule::compile(p)).collect::<Result<Vec<_>>>().map(PatternList)
    }

    fn matches(&self, filename: &str) -> bool {
        self.0.iter().any(|rule| rule.matches(filename))
    }
}

/// Glob-or-suffix matching against a hostname (§4.8 "Host-pattern lists
/// match glob-or-suffix against hostnames").
struct HostPatternList(Vec<PatternRule>);

impl HostPatternList {
    fn compile(raw: &[String]) -> Result<Self> {
        raw.iter().map(|p| PatternRule::compile(p)).collect::<Result<Vec<_>>>().map(HostPatternList)
    }

    fn matches(&self, host: &str) -> bool {
        self.0.iter().any(|rule| rule.matches(host))
    }
}

/// A seed's scope: its root domain and the directory prefix used by the
/// parent-ascent rule (§8 "Parent rule").
#[derive(Debug, Clone)]
struct SeedScope {
    host: String,
    directory_prefix: String,
}

pub struct Filters {
    accept: PatternList,
    reject: PatternList,
    accept_regex: Option<Regex>,
    reject_regex: Option<Regex>,
    exclude_domains: HostPatternList,
    domains: HostPatternList,
    span_hosts: bool,
    no_parent: bool,
    seeds: Vec<SeedScope>,
}

impl Filters {
    pub fn compile(config: &crate::config::Config, seeds: &[Url]) -> Result<Self> {
        let accept_regex = config
            .accept_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("invalid --accept-regex: {e}")))?;
        let reject_regex = config
            .reject_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("invalid --reject-regex: {e}")))?;

        Ok(Filters {
            accept: PatternList::compile(&config.accept_globs)?,
            reject: PatternList::compile(&config.reject_globs)?,
            accept_regex,
            reject_regex,
            exclude_domains: HostPatternList::compile(&config.exclude_domains)?,
            domains: HostPatternList::compile(&config.domains)?,
            span_hosts: config.span_hosts,
            no_parent: config.no_parent,
            seeds: seeds
                .iter()
                .filter_map(|seed| {
                    Some(SeedScope {
                        host: seed.host_str()?.to_string(),
                        directory_prefix: seed.directory_prefix().to_string(),
                    })
                })
                .collect(),
        })
    }

    /// Host-scope rule (§4.4 step 5): `span_hosts` off rejects any host not
    /// in the seeded domain set; `exclude_domains` always rejects.
    pub fn host_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        if self.exclude_domains.matches(host) {
            return false;
        }

        if !self.domains.0.is_empty() && self.domains.matches(host) {
            return true;
        }

        if self.span_hosts {
            return true;
        }

        self.seeds.iter().any(|seed| seed.host == host)
    }

    /// Parent-ascent rule (§4.4 step 5, §8 "Parent rule"): with `--no-parent`
    /// every admitted URL's path must be prefixed by some same-host seed's
    /// directory.
    pub fn parent_allowed(&self, url: &Url) -> bool {
        if !self.no_parent {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        self.seeds
            .iter()
            .filter(|seed| seed.host == host)
            .any(|seed| url.is_under_parent(&seed.directory_prefix))
    }

    /// Accept/reject pattern and regex filters (§4.8), evaluated against the
    /// URL's filename-shaped tail (the same text `filename::derive` would
    /// produce the last path segment from).
    pub fn pattern_allowed(&self, url: &Url) -> bool {
        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");

        if !self.reject.0.is_empty() && self.reject.matches(filename) {
            return false;
        }
        if !self.accept.0.is_empty() && !self.accept.matches(filename) {
            return false;
        }

        if let Some(re) = &self.reject_regex {
            if re.is_match(url.as_str()) {
                return false;
            }
        }
        if let Some(re) = &self.accept_regex {
            if !re.is_match(url.as_str()) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn seed(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn span_hosts_off_restricts_to_seed_hosts() {
        let mut config = Config::default();
        config.span_hosts = false;
        let seeds = vec![seed("http://a.com/")];
        let filters = Filters::compile(&config, &seeds).unwrap();

        assert!(filters.host_allowed(&seed("http://a.com/x")));
        assert!(!filters.host_allowed(&seed("http://b.com/x")));
    }

    #[test]
    fn exclude_domains_always_rejects() {
        let mut config = Config::default();
        config.span_hosts = true;
        config.exclude_domains = vec!["bad.com".to_string()];
        let filters = Filters::compile(&config, &[]).unwrap();

        assert!(!filters.host_allowed(&seed("http://bad.com/")));
        assert!(filters.host_allowed(&seed("http://good.com/")));
    }

    #[test]
    fn no_parent_confines_to_seed_directory() {
        let mut config = Config::default();
        config.no_parent = true;
        let seeds = vec![seed("http://a.com/docs/")];
        let filters = Filters::compile(&config, &seeds).unwrap();

        assert!(filters.parent_allowed(&seed("http://a.com/docs/sub/page.html")));
        assert!(!filters.parent_allowed(&seed("http://a.com/other/page.html")));
    }

    #[test]
    fn suffix_pattern_rejects_extension() {
        let mut config = Config::default();
        config.reject_globs = vec![".gif".to_string()];
        let filters = Filters::compile(&config, &[]).unwrap();

        assert!(!filters.pattern_allowed(&seed("http://a.com/cat.gif")));
        assert!(filters.pattern_allowed(&seed("http://a.com/cat.png")));
    }

    #[test]
    fn glob_pattern_is_detected_by_wildcard_chars() {
        let mut config = Config::default();
        config.accept_globs = vec!["index.*".to_string()];
        let filters = Filters::compile(&config, &[]).unwrap();

        assert!(filters.pattern_allowed(&seed("http://a.com/index.html")));
        assert!(!filters.pattern_allowed(&seed("http://a.com/other.html")));
    }
}
