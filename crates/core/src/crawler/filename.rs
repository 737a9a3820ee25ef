//! Local filename derivation and save policy (§4.6). Kept as a pure
//! `Url + Config -> PathBuf` function plus a small `SaveWriter` that owns the
//! mkdir cascade and clash-avoidance so that discipline is localized to one
//! type rather than documented as a convention (§9 Design Notes).

use std::path::{Path, PathBuf};

use url::Url;

use crate::config::{Config, RestrictFileNames};
use crate::error::Result;

/// Derives the local on-disk path for `url`, following §4.6 in order:
/// directory prefix, optional scheme/host components, the URL path (minus
/// `cut_dirs` leading components), query handling, and
/// `restrict_file_names`.
pub fn derive(url: &Url, config: &Config) -> PathBuf {
    let mut dir = config.directory_prefix.clone();

    if !config.no_host_directories {
        if let Some(host) = url.host_str() {
            dir.push(host);
        }
    }

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(str::to_string).collect())
        .unwrap_or_default();

    // drop the final (filename) segment for now; it's handled separately so
    // cut_dirs only ever removes *directory* components.
    let filename_segment = segments.pop();

    let cut = config.cut_dirs.min(segments.len());
    let segments = &segments[cut..];

    if !config.no_directories {
        for segment in segments {
            dir.push(restrict(segment, config.restrict_file_names));
        }
    }

    let mut filename = match filename_segment {
        Some(name) if !name.is_empty() => name,
        _ => "index.html".to_string(),
    };

    if !config.cut_file_get_vars {
        if let Some(query) = url.query() {
            filename.push('@');
            filename.push_str(query);
        }
    }

    dir.push(restrict(&filename, config.restrict_file_names));
    dir
}

fn restrict(segment: &str, mode: RestrictFileNames) -> String {
    let illegal: &[char] = match mode {
        RestrictFileNames::Unix => &['\0', '/'],
        RestrictFileNames::Windows => &['\0', '/', '\\', ':', '*', '?', '"', '<', '>', '|'],
        RestrictFileNames::Ascii => &['\0', '/'],
        RestrictFileNames::Nocontrol => &['\0', '/'],
    };

    let mut out: String = segment
        .chars()
        .map(|c| {
            if illegal.contains(&c) || (matches!(mode, RestrictFileNames::Nocontrol) && c.is_control()) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if matches!(mode, RestrictFileNames::Ascii) {
        out = out.chars().map(|c| if c.is_ascii() { c } else { '_' }).collect();
    }

    out
}

/// Creates missing parent directories and resolves name/directory clashes by
/// moving the existing file aside with a numeric suffix, or by trying unique
/// `.1`..`.999` suffixes when `EXCL` fails (§4.6 "Save policy").
pub struct SaveWriter;

impl SaveWriter {
    /// Resolves `path` to the concrete path that should actually be
    /// written, applying backups/no-clobber/timestamping semantics. Creates
    /// parent directories as a side effect.
    pub fn prepare(path: &Path, config: &Config) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.is_dir() {
            return Self::unique_suffix(path);
        }

        if config.timestamping {
            return Ok(path.to_path_buf());
        }

        if !path.exists() {
            return Ok(path.to_path_buf());
        }

        if config.mirror && !config.no_clobber() {
            // --mirror backs up existing content by convention, rotating
            // file -> file.1 -> ... before the new write lands on `path`.
            Self::rotate_backups(path)?;
            return Ok(path.to_path_buf());
        }

        Self::unique_suffix(path)
    }

    fn rotate_backups(path: &Path) -> Result<()> {
        const MAX_BACKUPS: u32 = 99;
        for generation in (1..MAX_BACKUPS).rev() {
            let from = Self::numbered(path, generation);
            if from.exists() {
                let to = Self::numbered(path, generation + 1);
                std::fs::rename(&from, &to)?;
            }
        }
        if path.exists() {
            std::fs::rename(path, Self::numbered(path, 1))?;
        }
        Ok(())
    }

    fn numbered(path: &Path, generation: u32) -> PathBuf {
        let mut out = path.as_os_str().to_owned();
        out.push(format!(".{generation}"));
        PathBuf::from(out)
    }

    fn unique_suffix(path: &Path) -> Result<PathBuf> {
        for suffix in 1..=999u32 {
            let candidate = Self::numbered(path, suffix);
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Ok(Self::numbered(path, 999))
    }
}

impl Config {
    fn no_clobber(&self) -> bool {
        self.no_clobber
    }
}
