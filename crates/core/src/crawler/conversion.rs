//! Link conversion (§4.7): remembers where, in each saved document, a link
//! to another retrieved URL was written, then rewrites those spans to
//! relative filesystem paths once every retrieval has settled. Kept as its
//! own type rather than folded into the HTML parser so the terminal rewrite
//! pass can run lock-free, single-threaded, after the worker pool is gone
//! (§9 Design Notes).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use url::Url;

use crate::error::Result;

/// One URL reference found inside a saved document, recorded by byte offset
/// into the *original* bytes so the rewrite pass can splice without
/// re-parsing.
#[derive(Debug, Clone)]
pub struct LinkOffset {
    pub start: usize,
    pub end: usize,
    pub target: Url,
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    links: Vec<LinkOffset>,
}

/// Collects link offsets for every document as it's parsed, then rewrites
/// them in one pass at the end of the run. A single mutex guards the whole
/// table: entries are written once per document by whichever worker parsed
/// it, and the final rewrite only ever runs after the worker pool has
/// stopped submitting, so contention is not a concern.
#[derive(Default)]
pub struct ConversionRecorder {
    documents: Mutex<HashMap<PathBuf, DocumentRecord>>,
}

impl ConversionRecorder {
    /// Records every link offset found while parsing the document saved at
    /// `local_path`. Called once per successfully parsed HTML/CSS document,
    /// even if `convert_links` is off, so a later `--mirror` re-run that
    /// turns it on retroactively would find data already gathered for the
    /// run that produced it (the recorder itself is always cheap; the
    /// expensive part is the rewrite pass, which `finish` skips unless
    /// asked).
    pub fn record(&self, local_path: PathBuf, links: Vec<LinkOffset>) {
        if links.is_empty() {
            return;
        }
        let mut documents = self.documents.lock().unwrap();
        documents
            .entry(local_path)
            .or_insert_with(|| DocumentRecord { links: Vec::new() })
            .links
            .extend(links);
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().unwrap().is_empty()
    }

    /// Rewrites every recorded document in place. `resolve` maps a retrieved
    /// URL to the local file it ended up at, if any; links whose target was
    /// never retrieved (or failed) are left as absolute URLs. With
    /// `backup_converted`, the pre-rewrite bytes are preserved at
    /// `<path>.orig` before the rewrite lands.
    pub fn finish(
        &self,
        backup_converted: bool,
        resolve: impl Fn(&Url) -> Option<PathBuf>,
    ) -> Result<usize> {
        let documents = self.documents.lock().unwrap();
        let mut rewritten = 0;

        for (path, record) in documents.iter() {
            if rewrite_one(path, record, backup_converted, &resolve)? {
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }
}

fn rewrite_one(
    path: &Path,
    record: &DocumentRecord,
    backup_converted: bool,
    resolve: &impl Fn(&Url) -> Option<PathBuf>,
) -> Result<bool> {
    let Ok(original) = std::fs::read(path) else {
        // the file may have been pruned by a later --delete-after or never
        // actually landed (parse happened, save failed); skip it silently.
        return Ok(false);
    };

    let mut links: Vec<&LinkOffset> = record.links.iter().collect();
    links.sort_by_key(|l| l.start);

    let mut out = Vec::with_capacity(original.len());
    let mut cursor = 0usize;

    for link in &links {
        if link.start < cursor || link.end > original.len() || link.start > link.end {
            continue;
        }
        out.extend_from_slice(&original[cursor..link.start]);

        let replacement = match resolve(&link.target) {
            Some(local_path) => relative_path(path, &local_path),
            None => link.target.to_string(),
        };
        out.extend_from_slice(replacement.as_bytes());

        cursor = link.end;
    }
    out.extend_from_slice(&original[cursor..]);

    if out == original {
        return Ok(false);
    }

    if backup_converted {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".orig");
        std::fs::write(PathBuf::from(backup), &original)?;
    }

    std::fs::write(path, out)?;
    Ok(true)
}

/// A relative path from `from`'s directory to `to`, falling back to `to`
/// itself if they don't share a common ancestor (e.g. different drives on
/// Windows, or a `to` outside `directory_prefix`).
fn relative_path(from: &Path, to: &Path) -> String {
    let Some(from_dir) = from.parent() else {
        return to.display().to_string();
    };

    let from_components: Vec<_> = from_dir.components().collect();
    let to_components: Vec<_> = to.components().collect();

    let common = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && !from_components.is_empty() {
        return to.display().to_string();
    }

    let mut relative = PathBuf::new();
    for _ in common..from_components.len() {
        relative.push("..");
    }
    for component in &to_components[common..] {
        relative.push(component.as_os_str());
    }

    relative.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_known_link_and_leaves_unknown_as_absolute_url() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("index.html");
        std::fs::write(&doc_path, b"<a href=\"URL_A\"></a><a href=\"URL_B\"></a>").unwrap();

        let known = Url::parse("http://a.com/known.html").unwrap();
        let unknown = Url::parse("http://a.com/missing.html").unwrap();
        let known_local = dir.path().join("known.html");

        let recorder = ConversionRecorder::default();
        recorder.record(
            doc_path.clone(),
            vec![
                LinkOffset { start: 9, end: 14, target: known.clone() },
                LinkOffset { start: 29, end: 34, target: unknown.clone() },
            ],
        );

        let rewritten = recorder
            .finish(false, |url| {
                if *url == known { Some(known_local.clone()) } else { None }
            })
            .unwrap();

        assert_eq!(rewritten, 1);
        let contents = std::fs::read_to_string(&doc_path).unwrap();
        assert!(contents.contains("known.html"));
        assert!(contents.contains("http://a.com/missing.html"));
    }

    #[test]
    fn backup_converted_preserves_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("index.html");
        std::fs::write(&doc_path, b"<a href=\"URL_A\"></a>").unwrap();

        let known = Url::parse("http://a.com/known.html").unwrap();
        let known_local = dir.path().join("known.html");

        let recorder = ConversionRecorder::default();
        recorder.record(
            doc_path.clone(),
            vec![LinkOffset { start: 9, end: 14, target: known.clone() }],
        );

        recorder
            .finish(true, |_| Some(known_local.clone()))
            .unwrap();

        let mut backup_path = doc_path.as_os_str().to_owned();
        backup_path.push(".orig");
        let backup = std::fs::read(PathBuf::from(backup_path)).unwrap();
        assert_eq!(backup, b"<a href=\"URL_A\"></a>");
    }

    #[test]
    fn empty_link_list_is_not_recorded() {
        let recorder = ConversionRecorder::default();
        recorder.record(PathBuf::from("/tmp/x.html"), vec![]);
        assert!(recorder.is_empty());
    }
}
