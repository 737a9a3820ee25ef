//! Layered configuration (§4.11): compiled defaults, an optional TOML config
//! file, then CLI flags, each layer overriding the previous one field by
//! field. A plain serde struct with `#[serde(default = "...")]` hooks into
//! `defaults`, loaded once at startup and then shared read-only
//! (`Arc<Config>`) by every worker.

mod defaults;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictFileNames {
    Unix,
    Windows,
    Ascii,
    Nocontrol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Auto,
    Html,
    Css,
    Sitemap,
    Atom,
    Rss,
    Metalink,
}

impl Default for ContentMode {
    fn default() -> Self {
        ContentMode::Auto
    }
}

/// `--regex-type` is accepted and validated but never changes matching
/// behavior: `accept_regex`/`reject_regex` always compile through the
/// `regex` crate regardless of which engine the user asked for. See
/// `DESIGN.md` for why POSIX/PCRE selection collapses onto one engine here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexEngine {
    Posix,
    Pcre,
}

impl Default for RegexEngine {
    fn default() -> Self {
        RegexEngine::Posix
    }
}

impl std::str::FromStr for RegexEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posix" => Ok(RegexEngine::Posix),
            "pcre" => Ok(RegexEngine::Pcre),
            other => Err(format!("unknown regex type {other:?} (want posix/pcre)")),
        }
    }
}

/// The machine/human format a `--stats-site`/`--stats-tree` writer emits
/// (§4.10): selected once at shutdown, never consulted mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    Human,
    Json,
    Csv,
}

/// Where to write the run's final counters, and in what format. Parsed from
/// a `FORMAT:FILE` CLI value or a `{format, path}` config-file table.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsOutput {
    pub format: StatsFormat,
    pub path: PathBuf,
}

impl std::str::FromStr for StatsOutput {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (format, path) = s
            .split_once(':')
            .ok_or_else(|| format!("expected FORMAT:FILE, got {s:?}"))?;
        let format = match format.to_ascii_lowercase().as_str() {
            "human" => StatsFormat::Human,
            "json" => StatsFormat::Json,
            "csv" => StatsFormat::Csv,
            other => return Err(format!("unknown stats format {other:?} (want human/json/csv)")),
        };
        if path.is_empty() {
            return Err(format!("missing file path in {s:?}"));
        }
        Ok(StatsOutput { format, path: PathBuf::from(path) })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgent {
    #[serde(default = "defaults::user_agent_token")]
    pub token: String,
    #[serde(default = "defaults::user_agent_full")]
    pub full: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        UserAgent {
            token: defaults::user_agent_token(),
            full: defaults::user_agent_full(),
        }
    }
}

/// The fully-merged, immutable configuration a `Retriever` run operates
/// under. Every field has a compiled default (see [`defaults`]), overridable
/// from a config file and then from the CLI, in that order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub seeds: Vec<String>,
    pub input_file: Option<PathBuf>,
    pub content_mode: ContentMode,

    pub recursive: bool,
    #[serde(default = "defaults::level")]
    pub level: u32,
    pub page_requisites: bool,
    pub no_parent: bool,
    pub span_hosts: bool,
    pub domains: Vec<String>,
    pub exclude_domains: Vec<String>,

    pub accept_globs: Vec<String>,
    pub reject_globs: Vec<String>,
    pub accept_regex: Option<String>,
    pub reject_regex: Option<String>,
    pub regex_type: RegexEngine,

    pub output_document: Option<PathBuf>,
    pub directory_prefix: PathBuf,
    pub no_directories: bool,
    pub no_host_directories: bool,
    pub no_clobber: bool,
    #[serde(default = "defaults::cut_dirs")]
    pub cut_dirs: usize,
    pub cut_file_get_vars: bool,
    #[serde(default = "defaults::restrict_file_names")]
    pub restrict_file_names: RestrictFileNames,

    #[serde(default = "defaults::wait_ms")]
    pub wait_ms: u64,
    pub random_wait: bool,
    #[serde(default = "defaults::waitretry_ms")]
    pub waitretry_ms: u64,
    #[serde(default = "defaults::tries")]
    pub tries: u32,
    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "defaults::connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "defaults::read_timeout_seconds")]
    pub read_timeout_seconds: u64,

    pub headers: Vec<String>,
    pub user_agent: UserAgent,
    pub user: Option<String>,
    pub password: Option<String>,
    pub post_data: Option<String>,
    pub keep_alive: bool,

    pub https_only: bool,
    pub no_check_certificate: bool,
    pub enable_ocsp: bool,
    pub enable_hsts: bool,
    pub hsts_file: Option<PathBuf>,
    pub enable_hpkp: bool,
    pub hpkp_file: Option<PathBuf>,

    pub spider: bool,
    pub convert_links: bool,
    pub backup_converted: bool,
    pub mirror: bool,
    pub timestamping: bool,
    pub chunk_size_bytes: Option<u64>,
    pub metalink: bool,
    pub xattr: bool,

    #[serde(default = "defaults::max_redirect")]
    pub max_redirect: usize,
    pub quota_bytes: Option<u64>,
    #[serde(default = "defaults::max_memory_bytes")]
    pub max_in_memory_response_bytes: usize,
    #[serde(default = "defaults::num_worker_threads")]
    pub num_worker_threads: usize,
    #[serde(default = "defaults::robots_txt_cache_sec")]
    pub robots_txt_cache_sec: u64,
    pub ignore_robots: bool,

    pub stats_output: Option<StatsOutput>,
}

impl Default for Config {
    // Built as a literal rather than via `toml::from_str("")`: the struct's
    // container-level `#[serde(default)]` falls back to `Config::default()`
    // for any field missing from the input, so deserializing through this
    // impl would recurse into itself forever on every empty/partial config.
    fn default() -> Self {
        Config {
            seeds: Vec::new(),
            input_file: None,
            content_mode: ContentMode::default(),

            recursive: false,
            level: defaults::level(),
            page_requisites: false,
            no_parent: false,
            span_hosts: false,
            domains: Vec::new(),
            exclude_domains: Vec::new(),

            accept_globs: Vec::new(),
            reject_globs: Vec::new(),
            accept_regex: None,
            reject_regex: None,
            regex_type: RegexEngine::Posix,

            output_document: None,
            directory_prefix: PathBuf::new(),
            no_directories: false,
            no_host_directories: false,
            no_clobber: false,
            cut_dirs: defaults::cut_dirs(),
            cut_file_get_vars: false,
            restrict_file_names: defaults::restrict_file_names(),

            wait_ms: defaults::wait_ms(),
            random_wait: false,
            waitretry_ms: defaults::waitretry_ms(),
            tries: defaults::tries(),
            timeout_seconds: defaults::timeout_seconds(),
            connect_timeout_seconds: defaults::connect_timeout_seconds(),
            read_timeout_seconds: defaults::read_timeout_seconds(),

            headers: Vec::new(),
            user_agent: UserAgent::default(),
            user: None,
            password: None,
            post_data: None,
            keep_alive: true,

            https_only: false,
            no_check_certificate: false,
            enable_ocsp: false,
            enable_hsts: true,
            hsts_file: None,
            enable_hpkp: false,
            hpkp_file: None,

            spider: false,
            convert_links: false,
            backup_converted: false,
            mirror: false,
            timestamping: false,
            chunk_size_bytes: None,
            metalink: false,
            xattr: false,

            max_redirect: defaults::max_redirect(),
            quota_bytes: None,
            max_in_memory_response_bytes: defaults::max_memory_bytes(),
            num_worker_threads: defaults::num_worker_threads(),
            robots_txt_cache_sec: defaults::robots_txt_cache_sec(),
            ignore_robots: false,

            stats_output: None,
        }
    }
}

/// CLI surface, merged over the config-file layer. Only flags explicitly
/// passed by the user override their config-file counterpart; this is why
/// every field here is `Option`/`bool` with `#[arg(long)]` rather than
/// mirroring `Config`'s defaults directly.
#[derive(Debug, Parser)]
#[command(name = "retriever", about = "Recursive, multi-threaded web retriever")]
pub struct Cli {
    /// URLs to retrieve.
    pub urls: Vec<String>,

    #[arg(short = 'i', long)]
    pub input_file: Option<PathBuf>,

    #[arg(long)]
    pub config_file: Option<PathBuf>,

    #[arg(short = 'r', long)]
    pub recursive: bool,
    #[arg(short = 'l', long)]
    pub level: Option<u32>,
    #[arg(short = 'p', long)]
    pub page_requisites: bool,
    #[arg(long)]
    pub no_parent: bool,
    #[arg(short = 'H', long)]
    pub span_hosts: bool,
    #[arg(short = 'D', long, value_delimiter = ',')]
    pub domains: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub exclude_domains: Vec<String>,

    #[arg(short = 'A', long, value_delimiter = ',')]
    pub accept: Vec<String>,
    #[arg(short = 'R', long, value_delimiter = ',')]
    pub reject: Vec<String>,
    #[arg(long)]
    pub accept_regex: Option<String>,
    #[arg(long)]
    pub reject_regex: Option<String>,
    /// `posix` or `pcre`; accepted for compatibility but both compile
    /// through the same `regex` crate engine.
    #[arg(long)]
    pub regex_type: Option<RegexEngine>,

    #[arg(short = 'O', long)]
    pub output_document: Option<PathBuf>,
    #[arg(short = 'P', long)]
    pub directory_prefix: Option<PathBuf>,
    #[arg(long)]
    pub no_directories: bool,
    #[arg(long)]
    pub no_host_directories: bool,
    #[arg(long)]
    pub cut_dirs: Option<usize>,
    #[arg(long)]
    pub cut_file_get_vars: bool,
    #[arg(long)]
    pub no_clobber: bool,

    #[arg(short = 'w', long)]
    pub wait_ms: Option<u64>,
    #[arg(long)]
    pub random_wait: bool,
    #[arg(short = 't', long)]
    pub tries: Option<u32>,
    #[arg(short = 'T', long)]
    pub timeout_seconds: Option<u64>,

    #[arg(long)]
    pub header: Vec<String>,
    #[arg(short = 'U', long)]
    pub user_agent: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub https_only: bool,
    #[arg(long)]
    pub no_check_certificate: bool,
    #[arg(long)]
    pub no_hsts: bool,
    #[arg(long)]
    pub hsts_file: Option<PathBuf>,

    #[arg(long)]
    pub spider: bool,
    #[arg(short = 'k', long)]
    pub convert_links: bool,
    #[arg(long)]
    pub backup_converted: bool,
    #[arg(short = 'm', long)]
    pub mirror: bool,
    #[arg(short = 'N', long)]
    pub timestamping: bool,
    #[arg(long)]
    pub metalink: bool,
    #[arg(long)]
    pub xattr: bool,

    #[arg(long)]
    pub max_redirect: Option<usize>,
    #[arg(short = 'Q', long)]
    pub quota: Option<u64>,
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,
    #[arg(long)]
    pub no_robots: bool,

    /// `FORMAT:FILE`, e.g. `json:stats.json` or `csv:stats.csv`.
    #[arg(long)]
    pub stats_site: Option<StatsOutput>,
}

impl Config {
    /// Builds the merged configuration: compiled defaults, then an optional
    /// config file resolved per the search order below, then CLI overrides.
    ///
    /// Config file resolution order: `--config-file`, else `$SYSTEM_RETRIEVERRC`,
    /// else `$RETRIEVERRC`, else `~/.retrieverrc`. The first that exists wins;
    /// it is not an error for none to exist.
    pub fn load(cli: Cli) -> Result<Config> {
        let mut config = match Self::resolve_config_file(&cli) {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        config.apply_cli(cli);
        Ok(config)
    }

    fn resolve_config_file(cli: &Cli) -> Option<PathBuf> {
        if let Some(path) = &cli.config_file {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var("SYSTEM_RETRIEVERRC") {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("RETRIEVERRC") {
            return Some(PathBuf::from(path));
        }
        let home = std::env::var("HOME").ok()?;
        let candidate = Path::new(&home).join(".retrieverrc");
        candidate.exists().then_some(candidate)
    }

    fn from_file(path: &Path) -> Result<Config> {
        let mut seen = HashSet::new();
        let text = Self::read_with_includes(path, &mut seen, 0)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Expands `include FILE` directives inline, depth-first, enforcing a
    /// recursion depth of 20 to catch include cycles without needing full
    /// cycle detection.
    fn read_with_includes(path: &Path, seen: &mut HashSet<PathBuf>, depth: usize) -> Result<String> {
        if depth > defaults::config_include_depth_limit() {
            return Err(Error::Config(format!(
                "config include depth exceeded at {}",
                path.display()
            )));
        }

        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !seen.insert(canonical) {
            return Err(Error::Config(format!(
                "config include cycle at {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;

        let mut out = String::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("include ") {
                let include_path = path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(rest.trim());
                out.push_str(&Self::read_with_includes(&include_path, seen, depth + 1)?);
                out.push('\n');
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }

        Ok(out)
    }

    fn apply_cli(&mut self, cli: Cli) {
        if !cli.urls.is_empty() {
            self.seeds = cli.urls;
        }
        if cli.input_file.is_some() {
            self.input_file = cli.input_file;
        }

        self.recursive |= cli.recursive;
        if let Some(level) = cli.level {
            self.level = level;
        }
        self.page_requisites |= cli.page_requisites;
        self.no_parent |= cli.no_parent;
        self.span_hosts |= cli.span_hosts;
        self.domains.extend(cli.domains);
        self.exclude_domains.extend(cli.exclude_domains);

        self.accept_globs.extend(cli.accept);
        self.reject_globs.extend(cli.reject);
        if cli.accept_regex.is_some() {
            self.accept_regex = cli.accept_regex;
        }
        if cli.reject_regex.is_some() {
            self.reject_regex = cli.reject_regex;
        }

        if cli.output_document.is_some() {
            self.output_document = cli.output_document;
        }
        if let Some(dir) = cli.directory_prefix {
            self.directory_prefix = dir;
        }
        self.no_directories |= cli.no_directories;
        self.no_host_directories |= cli.no_host_directories;
        if let Some(cut) = cli.cut_dirs {
            self.cut_dirs = cut;
        }
        self.cut_file_get_vars |= cli.cut_file_get_vars;
        self.no_clobber |= cli.no_clobber;

        if let Some(wait) = cli.wait_ms {
            self.wait_ms = wait;
        }
        self.random_wait |= cli.random_wait;
        if let Some(tries) = cli.tries {
            self.tries = tries;
        }
        if let Some(timeout) = cli.timeout_seconds {
            self.timeout_seconds = timeout;
        }

        self.headers.extend(cli.header);
        if let Some(agent) = cli.user_agent {
            self.user_agent.full = agent;
        }
        if cli.user.is_some() {
            self.user = cli.user;
        }
        if cli.password.is_some() {
            self.password = cli.password;
        }

        self.https_only |= cli.https_only;
        self.no_check_certificate |= cli.no_check_certificate;
        if cli.no_hsts {
            self.enable_hsts = false;
        }
        if cli.hsts_file.is_some() {
            self.hsts_file = cli.hsts_file;
        }

        self.spider |= cli.spider;
        self.convert_links |= cli.convert_links;
        self.backup_converted |= cli.backup_converted;
        if cli.mirror {
            self.mirror = true;
            self.recursive = true;
            self.level = u32::MAX;
            self.timestamping = true;
        }
        self.timestamping |= cli.timestamping;
        self.metalink |= cli.metalink;
        self.xattr |= cli.xattr;

        if let Some(max_redirect) = cli.max_redirect {
            self.max_redirect = max_redirect;
        }
        if cli.quota.is_some() {
            self.quota_bytes = cli.quota;
        }
        if let Some(jobs) = cli.jobs {
            self.num_worker_threads = jobs;
        }
        if cli.no_robots {
            self.ignore_robots = true;
        }
        if cli.stats_site.is_some() {
            self.stats_output = cli.stats_site;
        }
    }
}
