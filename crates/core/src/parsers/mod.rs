//! Document parsers (§4.4 "Discovery"): turn a saved document's bytes into
//! the set of child URLs (with byte offsets, for link conversion) it
//! references. Dispatch on content-type happens once, here, rather than at
//! each call site, via the closed `ContentKind` enum (§9 Design Notes).

pub mod css;
pub mod feed;
pub mod html;
pub mod metalink;
pub mod sitemap;

use url::Url;

use crate::crawler::conversion::LinkOffset;

/// The parseable document kinds the crawler recurses through. Closed
/// deliberately: an unrecognized content-type is never guessed at by
/// sniffing bytes, it's just not recursed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Feed,
    Sitemap,
    Metalink,
}

impl ContentKind {
    /// Classifies a response by its `Content-Type` header and, for sitemaps
    /// specifically, the URL's own path (a gzip-compressed sitemap has a
    /// `.xml.gz` suffix regardless of the content-type the server sent).
    pub fn classify(content_type: Option<&str>, url: &Url) -> Option<ContentKind> {
        let path = url.path();
        if path.ends_with(".xml.gz") || path.ends_with("sitemap.gz") {
            return Some(ContentKind::Sitemap);
        }

        // A 304 Not Modified reparse (§4.5 "HEAD responses") carries no
        // Content-Type at all; fall back to the URL's own extension rather
        // than skip recursion for a document already known to be HTML/CSS.
        let Some(content_type) = content_type else {
            return if path.ends_with(".html") || path.ends_with(".htm") {
                Some(ContentKind::Html)
            } else if path.ends_with(".css") {
                Some(ContentKind::Css)
            } else {
                None
            };
        };
        if content_type.contains("html") || content_type.contains("xhtml") {
            Some(ContentKind::Html)
        } else if content_type.contains("css") {
            Some(ContentKind::Css)
        } else if content_type.contains("atom") || content_type.contains("rss") {
            Some(ContentKind::Feed)
        } else if content_type.contains("metalink") {
            Some(ContentKind::Metalink)
        } else if path.ends_with(".xml") && (path.contains("sitemap") || content_type.contains("xml")) {
            Some(ContentKind::Sitemap)
        } else {
            None
        }
    }
}

/// One discovered child reference: the resolved absolute URL, and (when the
/// format carries byte offsets, i.e. HTML/CSS) the span in the original
/// document that referenced it.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub url: Url,
    pub offset: Option<LinkOffset>,
    /// True for resources a page requires to render (images, stylesheets)
    /// rather than ordinary hyperlinks, so `page_requisites` admission can
    /// tell them apart from `recursive` admission (§4.4 step 4).
    pub is_requisite: bool,
}

/// Resolves a raw `href`/`src`/`url()` string against the document's base
/// URL, dropping anything that isn't `http`/`https` (`mailto:`,
/// `javascript:`, `data:`, ...) — those schemes can never be recursed into,
/// so parsers never even hand them to admission.
pub fn resolve_link(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let resolved = base.join(raw).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_content_type() {
        let url = Url::parse("http://a.com/page").unwrap();
        assert_eq!(ContentKind::classify(Some("text/html; charset=utf-8"), &url), Some(ContentKind::Html));
        assert_eq!(ContentKind::classify(Some("text/css"), &url), Some(ContentKind::Css));
        assert_eq!(ContentKind::classify(Some("application/rss+xml"), &url), Some(ContentKind::Feed));
        assert_eq!(ContentKind::classify(Some("application/octet-stream"), &url), None);
    }

    #[test]
    fn classifies_gzipped_sitemap_by_url_suffix_regardless_of_content_type() {
        let url = Url::parse("http://a.com/sitemap.xml.gz").unwrap();
        assert_eq!(ContentKind::classify(Some("application/octet-stream"), &url), Some(ContentKind::Sitemap));
    }
}
