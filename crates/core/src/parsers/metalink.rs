//! Metalink XML parsing (§3, §8 "Round-trip of Metalink"): reads a
//! Metalink 3/4 descriptor into the crawler's `Metalink` type. Both
//! versions share enough element names (`file`, `size`, `hash`, `url`,
//! `pieces`/`piece`) that one event loop covers both, the same way the
//! sitemap parser covers both a plain sitemap and a sitemap index in one
//! pass.

use quick_xml::events::Event;
use url::Url;

use crate::crawler::{Metalink, Mirror, Piece};

/// Parses a Metalink document's bytes. Returns `None` if no `<file>`
/// element with at least one `<url>` mirror was found — a best-effort
/// parse, since a malformed or partial descriptor should fall back to a
/// plain GET of the origin URL rather than fail the whole Job.
pub fn parse(bytes: &[u8]) -> Option<Metalink> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = quick_xml::Reader::from_str(&text);

    let mut file_name = None;
    let mut total_size = 0u64;
    let mut file_hash = None;
    let mut mirrors = Vec::new();
    let mut pieces = Vec::new();

    let mut in_file = false;
    let mut in_hash = false;
    let mut in_url = false;
    let mut in_size = false;
    let mut in_piece = false;
    let mut in_pieces = false;
    let mut hash_type = String::new();
    let mut current_priority = 1u32;
    let mut piece_index = 0usize;
    let mut piece_length = 0u64;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.name().as_ref() {
                    b"file" => {
                        in_file = true;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"name" {
                                file_name = attr.unescape_value().ok().map(|v| v.into_owned());
                            }
                        }
                    }
                    b"size" => in_size = true,
                    b"hash" => {
                        in_hash = true;
                        hash_type = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"type")
                            .and_then(|a| a.unescape_value().ok())
                            .map(|v| v.into_owned())
                            .unwrap_or_default();
                    }
                    b"url" if in_file => {
                        in_url = true;
                        current_priority = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"priority")
                            .and_then(|a| a.unescape_value().ok())
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(1);
                    }
                    b"pieces" => {
                        in_pieces = true;
                        piece_length = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"length")
                            .and_then(|a| a.unescape_value().ok())
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                    }
                    b"piece" if in_pieces => {
                        in_piece = true;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"file" => in_file = false,
                b"size" => in_size = false,
                b"hash" => in_hash = false,
                b"url" => in_url = false,
                b"pieces" => in_pieces = false,
                b"piece" => {
                    in_piece = false;
                    piece_index += 1;
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else { continue };
                let text = text.trim();
                if in_size && !in_pieces {
                    total_size = text.parse().unwrap_or(0);
                } else if in_hash && in_file && !in_pieces && hash_type.eq_ignore_ascii_case("sha-256") {
                    file_hash = Some(text.to_ascii_lowercase());
                } else if in_url && in_file {
                    if let Ok(url) = Url::parse(text) {
                        mirrors.push(Mirror { url, priority: current_priority, location: None });
                    }
                } else if in_piece && in_pieces {
                    pieces.push(Piece {
                        index: piece_index,
                        length: piece_length,
                        sha256: text.to_ascii_lowercase(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("failed to parse metalink xml: {e}");
                break;
            }
            _ => {}
        }
    }

    if mirrors.is_empty() {
        return None;
    }

    Some(Metalink {
        file_name: file_name.unwrap_or_else(|| "download".to_string()),
        total_size,
        pieces,
        mirrors,
        file_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0"?>
    <metalink version="4.0">
      <file name="example.iso">
        <size>20</size>
        <hash type="sha-256">deadbeef</hash>
        <url priority="1">https://mirror-a.com/example.iso</url>
        <url priority="2">https://mirror-b.com/example.iso</url>
        <pieces length="10">
          <piece>aaaa</piece>
          <piece>bbbb</piece>
        </pieces>
      </file>
    </metalink>"#;

    #[test]
    fn parses_file_name_size_and_mirrors() {
        let metalink = parse(DESCRIPTOR.as_bytes()).unwrap();
        assert_eq!(metalink.file_name, "example.iso");
        assert_eq!(metalink.total_size, 20);
        assert_eq!(metalink.mirrors.len(), 2);
        assert_eq!(metalink.mirrors[0].priority, 1);
    }

    #[test]
    fn parses_piece_hashes_and_whole_file_hash() {
        let metalink = parse(DESCRIPTOR.as_bytes()).unwrap();
        assert_eq!(metalink.file_hash.as_deref(), Some("deadbeef"));
        assert_eq!(metalink.pieces.len(), 2);
        assert_eq!(metalink.pieces[0].sha256, "aaaa");
        assert_eq!(metalink.pieces[1].index, 1);
    }

    #[test]
    fn missing_mirrors_yields_none() {
        let empty = r#"<metalink><file name="x"></file></metalink>"#;
        assert!(parse(empty.as_bytes()).is_none());
    }
}
