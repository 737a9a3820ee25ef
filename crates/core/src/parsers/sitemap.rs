//! Sitemap parsing (§4.4 "Sitemap discovery"): XML sitemaps and sitemap
//! indexes, gzip-compressed or not, plus the plain-text one-URL-per-line
//! variant. Built around the same `quick_xml` event-matching style used
//! throughout this crate's parsers, generalized to also recognize
//! `<sitemapindex>` nesting and to fall back to plain text.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use std::io::Read;
use url::Url;

use crate::dated_url::DatedUrl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapEntry {
    Url(DatedUrl),
    Sitemap(Url),
}

/// Decompresses `bytes` if they look gzip-magic-prefixed, then parses as
/// XML sitemap/sitemap-index; if XML parsing finds nothing at all, falls
/// back to treating the body as a plain-text sitemap (one absolute URL per
/// line, blank lines and `#` comments ignored).
pub fn parse(bytes: &[u8]) -> Vec<SitemapEntry> {
    let bytes = maybe_decompress(bytes);
    let text = String::from_utf8_lossy(&bytes);

    let xml_entries = parse_xml(&text);
    if !xml_entries.is_empty() {
        return xml_entries;
    }

    parse_plain_text(&text)
}

fn maybe_decompress(bytes: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = Vec::new();
        if decoder.read_to_end(&mut out).is_ok() {
            return std::borrow::Cow::Owned(out);
        }
    }
    std::borrow::Cow::Borrowed(bytes)
}

fn parse_xml(s: &str) -> Vec<SitemapEntry> {
    let mut reader = quick_xml::Reader::from_str(s);

    let mut res = vec![];

    let mut in_sitemap = false;
    let mut in_url = false;
    let mut in_loc = false;
    let mut in_lastmod = false;

    let mut current_url: Option<Url> = None;
    let mut current_lastmod: Option<DateTime<Utc>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"sitemap" => in_sitemap = true,
                b"url" => in_url = true,
                b"loc" => in_loc = true,
                b"lastmod" => in_lastmod = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"sitemap" => {
                    in_sitemap = false;
                    if let Some(url) = current_url.take() {
                        res.push(SitemapEntry::Sitemap(url));
                    }
                }
                b"url" => {
                    in_url = false;
                    if let Some(url) = current_url.take() {
                        res.push(SitemapEntry::Url(DatedUrl {
                            url,
                            last_modified: current_lastmod.take(),
                        }));
                    }
                }
                b"loc" => in_loc = false,
                b"lastmod" => in_lastmod = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else { continue };
                if in_loc && (in_sitemap || in_url) {
                    if let Ok(url) = Url::parse(text.trim()) {
                        current_url = Some(url);
                    }
                } else if in_lastmod && in_url {
                    if let Ok(date) = DateTime::parse_from_rfc3339(text.trim()) {
                        current_lastmod = Some(date.with_timezone(&Utc));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("failed to parse sitemap xml: {e}");
                break;
            }
            _ => {}
        }
    }

    res
}

fn parse_plain_text(s: &str) -> Vec<SitemapEntry> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| Url::parse(line).ok())
        .map(|url| SitemapEntry::Url(DatedUrl { url, last_modified: None }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://a.com/sitemap-1.xml</loc></sitemap>
            <sitemap><loc>https://a.com/sitemap-2.xml</loc></sitemap>
        </sitemapindex>"#;
        let entries = parse(xml.as_bytes());
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], SitemapEntry::Sitemap(_)));
    }

    #[test]
    fn parses_urlset_with_lastmod() {
        let xml = r#"<urlset>
            <url>
                <loc>https://a.com/page</loc>
                <lastmod>2024-01-01T00:00:00Z</lastmod>
            </url>
        </urlset>"#;
        let entries = parse(xml.as_bytes());
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            SitemapEntry::Url(dated) => {
                assert_eq!(dated.url.as_str(), "https://a.com/page");
                assert!(dated.last_modified.is_some());
            }
            _ => panic!("expected a url entry"),
        }
    }

    #[test]
    fn falls_back_to_plain_text_sitemap() {
        let text = "# comment\nhttps://a.com/one\n\nhttps://a.com/two\n";
        let entries = parse(text.as_bytes());
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn decompresses_gzip_sitemaps() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let xml = r#"<urlset><url><loc>https://a.com/gz</loc></url></urlset>"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let entries = parse(&compressed);
        assert_eq!(entries.len(), 1);
    }
}
