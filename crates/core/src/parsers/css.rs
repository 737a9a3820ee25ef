//! CSS link discovery (§4.4 "Discovery", §4.5 "Full responses"): `url(...)`
//! references and `@import`, with byte offsets for link conversion (§4.7).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::crawler::conversion::LinkOffset;
use crate::parsers::{resolve_link, Discovered};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]*))\s*\)"#).unwrap()
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+"([^"]*)""#).unwrap()
});

pub struct CssDocument {
    pub discovered: Vec<Discovered>,
}

pub fn parse(text: &str, base: &Url) -> CssDocument {
    let mut discovered = Vec::new();

    for caps in URL_RE.captures_iter(text) {
        let Some(m) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else { continue };
        push(m.start(), m.end(), m.as_str(), base, &mut discovered);
    }

    for caps in IMPORT_RE.captures_iter(text) {
        let m = caps.get(1).unwrap();
        push(m.start(), m.end(), m.as_str(), base, &mut discovered);
    }

    CssDocument { discovered }
}

fn push(start: usize, end: usize, raw: &str, base: &Url, out: &mut Vec<Discovered>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    if let Some(resolved) = resolve_link(base, raw) {
        out.push(Discovered {
            url: resolved.clone(),
            offset: Some(LinkOffset { start, end, target: resolved }),
            is_requisite: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://a.com/css/site.css").unwrap()
    }

    #[test]
    fn finds_unquoted_and_quoted_url_refs() {
        let css = r#".a { background: url(bg.png); } .b { background: url("bg2.png"); }"#;
        let doc = parse(css, &base());
        assert_eq!(doc.discovered.len(), 2);
        assert_eq!(doc.discovered[0].url.as_str(), "http://a.com/css/bg.png");
        assert_eq!(doc.discovered[1].url.as_str(), "http://a.com/css/bg2.png");
        assert!(doc.discovered.iter().all(|d| d.is_requisite));
    }

    #[test]
    fn finds_import_statements() {
        let css = r#"@import "reset.css"; body { color: red; }"#;
        let doc = parse(css, &base());
        assert_eq!(doc.discovered.len(), 1);
        assert_eq!(doc.discovered[0].url.as_str(), "http://a.com/css/reset.css");
    }

    #[test]
    fn ignores_data_uris() {
        let css = r#".a { background: url(data:image/png;base64,AAAA); }"#;
        let doc = parse(css, &base());
        assert!(doc.discovered.is_empty());
    }

    #[test]
    fn offset_spans_exactly_the_url_text() {
        let css = r#"url(bg.png)"#;
        let doc = parse(css, &base());
        let offset = doc.discovered[0].offset.as_ref().unwrap();
        assert_eq!(&css[offset.start..offset.end], "bg.png");
    }
}
