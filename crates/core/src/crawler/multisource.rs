//! Metalink and chunked multi-source retrieval (§3, §4.5 "Multi-part
//! Jobs"). A `MultiSourceJob` owns one `Metalink` descriptor and the
//! in-progress `Part` table; the worker loop asks it for the next
//! unclaimed part, reports completions, and asks it whether the whole file
//! is ready to be assembled and checksum-verified.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::crawler::{Job, Metalink, Mirror, Part};
use crate::error::{Error, Result};

/// Coordinates part dispatch and mirror selection for one multi-part Job.
/// Not `Send`-shared directly; the worker that owns a Job's turn mutates it
/// and puts it back in the `Host` queue, the same single-writer discipline
/// `host.rs` already uses for the rest of a Job's fields.
pub struct MultiSourceJob<'a> {
    metalink: &'a Metalink,
    parts: &'a mut Vec<Part>,
}

impl<'a> MultiSourceJob<'a> {
    pub fn new(job: &'a mut Job) -> Option<Self> {
        let Job { metalink, parts, .. } = job;
        let metalink = metalink.as_ref()?;
        Some(MultiSourceJob { metalink, parts })
    }

    /// Seeds the part table from the descriptor's pieces, in file order.
    pub fn init_parts(metalink: &Metalink) -> Vec<Part> {
        let mut position = 0u64;
        metalink
            .pieces
            .iter()
            .map(|piece| {
                let part = Part::from_piece(piece, position);
                position += piece.length;
                part
            })
            .collect()
    }

    /// Claims the next unclaimed, undone part (marking it `inuse`), or
    /// `None` if every part is either done or already claimed by another
    /// worker.
    pub fn claim_next(&mut self) -> Option<&mut Part> {
        let part = self.parts.iter_mut().find(|p| !p.done && !p.inuse)?;
        part.inuse = true;
        Some(part)
    }

    pub fn release(&mut self, id: usize) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.id == id) {
            part.inuse = false;
        }
    }

    pub fn complete(&mut self, id: usize) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.id == id) {
            part.done = true;
            part.inuse = false;
        }
    }

    pub fn all_done(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|p| p.done)
    }

    /// Mirror selection (§3): highest-priority mirror first, falling back
    /// through the list in priority order as earlier ones are exhausted or
    /// fail. `exclude` carries mirrors the caller has already tried and
    /// failed against for this part.
    pub fn select_mirror(&self, exclude: &[usize]) -> Option<&'a Mirror> {
        self.metalink
            .mirrors
            .iter()
            .enumerate()
            .filter(|(i, _)| !exclude.contains(i))
            .min_by_key(|(_, m)| m.priority)
            .map(|(_, m)| m)
    }
}

/// Assembles the completed per-piece files (written by the worker loop into
/// `<local_path>.part<N>` as each finishes) into the final file, verifying
/// each piece's SHA-256 and, if present, the whole-file checksum (§8
/// "Round-trip of Metalink"). Returns an error rather than leaving a
/// partially-assembled file on checksum failure.
pub fn assemble(local_path: &Path, metalink: &Metalink) -> Result<()> {
    let mut assembled = Vec::with_capacity(metalink.total_size as usize);

    for piece in &metalink.pieces {
        let part_path = part_path(local_path, piece.index);
        let bytes = std::fs::read(&part_path)?;

        if !piece.sha256.is_empty() {
            let digest = hex::encode(Sha256::digest(&bytes));
            if !digest.eq_ignore_ascii_case(&piece.sha256) {
                return Err(Error::ChecksumMismatch(format!(
                    "{} piece {}",
                    metalink.file_name, piece.index
                )));
            }
        }

        assembled.extend_from_slice(&bytes);
    }

    if let Some(expected) = &metalink.file_hash {
        let digest = hex::encode(Sha256::digest(&assembled));
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(Error::ChecksumMismatch(metalink.file_name.clone()));
        }
    }

    std::fs::write(local_path, assembled)?;

    for piece in &metalink.pieces {
        let _ = std::fs::remove_file(part_path(local_path, piece.index));
    }

    Ok(())
}

pub(crate) fn part_path(local_path: &Path, index: usize) -> std::path::PathBuf {
    let mut name = local_path.as_os_str().to_owned();
    name.push(format!(".part{index}"));
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{HostKey, Piece};
    use url::Url;

    fn metalink() -> Metalink {
        Metalink {
            file_name: "f.bin".to_string(),
            total_size: 20,
            pieces: vec![
                Piece { index: 0, length: 10, sha256: String::new() },
                Piece { index: 1, length: 10, sha256: String::new() },
            ],
            mirrors: vec![
                Mirror { url: Url::parse("http://a.com/f.bin").unwrap(), priority: 2, location: None },
                Mirror { url: Url::parse("http://b.com/f.bin").unwrap(), priority: 1, location: None },
            ],
            file_hash: None,
        }
    }

    #[test]
    fn init_parts_computes_positions() {
        let ml = metalink();
        let parts = MultiSourceJob::init_parts(&ml);
        assert_eq!(parts[0].position, 0);
        assert_eq!(parts[1].position, 10);
    }

    #[test]
    fn claim_and_complete_cycle() {
        let ml = metalink();
        let mut job = Job::seed(
            Url::parse("http://a.com/f.bin").unwrap(),
            HostKey { scheme: "http".to_string(), host: "a.com".to_string(), port: 80 },
        );
        job.metalink = Some(ml.clone());
        job.parts = MultiSourceJob::init_parts(&ml);

        let mut ms = MultiSourceJob::new(&mut job).unwrap();
        let first = ms.claim_next().unwrap().id;
        assert_eq!(first, 0);
        ms.complete(first);
        assert!(!ms.all_done());

        let second = ms.claim_next().unwrap().id;
        ms.complete(second);
        assert!(ms.all_done());
    }

    #[test]
    fn select_mirror_prefers_lowest_priority_number() {
        let ml = metalink();
        let mut job = Job::seed(
            Url::parse("http://a.com/f.bin").unwrap(),
            HostKey { scheme: "http".to_string(), host: "a.com".to_string(), port: 80 },
        );
        job.metalink = Some(ml);
        let ms = MultiSourceJob::new(&mut job).unwrap();

        let chosen = ms.select_mirror(&[]).unwrap();
        assert_eq!(chosen.url.host_str(), Some("b.com"));
    }

    #[test]
    fn assemble_rejects_piece_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("f.bin");

        let mut ml = metalink();
        ml.pieces[0].sha256 = "deadbeef".repeat(8);
        ml.pieces.truncate(1);
        ml.total_size = 10;

        let mut part0 = local_path.clone().into_os_string();
        part0.push(".part0");
        std::fs::write(&part0, b"0123456789").unwrap();

        let err = assemble(&local_path, &ml).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch(_)));
    }
}
