//! HTML link discovery (§4.4 "Discovery", §4.5 "Full responses"). Not a DOM
//! parser: the link-conversion invariant (§4.7) needs the exact byte span of
//! each attribute value in the *original* document, and a tree parser throws
//! that mapping away by rebuilding its own serialization. A small tag/attribute
//! scanner over the raw text keeps the offsets exact, the same way
//! `sitemap.rs`/`metalink.rs` scan XML without building a tree.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::crawler::conversion::LinkOffset;
use crate::parsers::{resolve_link, Discovered};

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(a|link|img|script|iframe|frame|source|form|base|meta)\b([^>]*)>"#).unwrap()
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-zA-Z][a-zA-Z0-9-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// The links found while scanning one HTML document, plus the `<base href>`
/// it should be resolved against (the document's own URL, if no override).
pub struct HtmlDocument {
    pub discovered: Vec<Discovered>,
    pub base: Url,
}

pub fn parse(text: &str, base: &Url) -> HtmlDocument {
    let base = find_base_override(text).unwrap_or_else(|| base.clone());
    let mut discovered = Vec::new();

    for tag in TAG_RE.captures_iter(text) {
        let tag_name = tag[1].to_ascii_lowercase();
        if tag_name == "base" {
            continue;
        }

        let attrs = &tag[2];
        let attrs_offset = tag.get(2).unwrap().start();

        if tag_name == "meta" {
            push_meta_refresh(attrs, attrs_offset, &base, &mut discovered);
            continue;
        }

        let attr_name = match tag_name.as_str() {
            "a" | "link" => "href",
            "form" => "action",
            _ => "src",
        };
        let is_requisite = match tag_name.as_str() {
            "link" => rel_is_requisite(attrs),
            "a" | "form" => false,
            _ => true,
        };

        if let Some((start, end, raw)) = find_attr(attrs, attr_name) {
            push_link(attrs_offset + start, attrs_offset + end, raw, &base, is_requisite, &mut discovered);
        }

        if tag_name == "img" {
            if let Some((start, _end, raw)) = find_attr(attrs, "srcset") {
                for (seg_offset, seg) in split_srcset(raw) {
                    let abs_start = attrs_offset + start + seg_offset;
                    push_link(abs_start, abs_start + seg.len(), seg, &base, true, &mut discovered);
                }
            }
        }
    }

    HtmlDocument { discovered, base }
}

fn push_link(start: usize, end: usize, raw: &str, base: &Url, is_requisite: bool, out: &mut Vec<Discovered>) {
    if let Some(resolved) = resolve_link(base, raw) {
        out.push(Discovered {
            url: resolved.clone(),
            offset: Some(LinkOffset { start, end, target: resolved }),
            is_requisite,
        });
    }
}

fn push_meta_refresh(attrs: &str, attrs_offset: usize, base: &Url, out: &mut Vec<Discovered>) {
    let Some((_, _, http_equiv)) = find_attr(attrs, "http-equiv") else { return };
    if !http_equiv.eq_ignore_ascii_case("refresh") {
        return;
    }
    let Some((content_start, _content_end, content)) = find_attr(attrs, "content") else { return };
    let Some(rel) = content.to_ascii_lowercase().find("url=") else { return };
    let raw = content[rel + 4..].trim().trim_matches(['"', '\'']);
    if raw.is_empty() {
        return;
    }
    let start = attrs_offset + content_start + rel + 4;
    push_link(start, start + raw.len(), raw, base, false, out);
}

/// Finds the first occurrence of attribute `name` within one tag's attribute
/// text, returning the value's byte span (relative to `attrs`, excluding the
/// surrounding quotes) and its raw (un-decoded) text.
fn find_attr<'a>(attrs: &'a str, name: &str) -> Option<(usize, usize, &'a str)> {
    ATTR_RE.captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        Some((value.start(), value.end(), value.as_str()))
    })
}

fn find_base_override(text: &str) -> Option<Url> {
    let tag = TAG_RE.captures_iter(text).find(|t| t[1].eq_ignore_ascii_case("base"))?;
    let (_, _, raw) = find_attr(&tag[2], "href")?;
    Url::parse(&unescape_entities(raw.trim())).ok()
}

fn rel_is_requisite(attrs: &str) -> bool {
    match find_attr(attrs, "rel") {
        Some((_, _, rel)) => rel
            .split_ascii_whitespace()
            .any(|token| matches!(token.to_ascii_lowercase().as_str(), "stylesheet" | "icon" | "shortcut icon" | "preload")),
        None => false,
    }
}

/// Splits a `srcset` value into `(byte_offset, url)` pairs, dropping each
/// entry's width/density descriptor.
fn split_srcset(value: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    for part in value.split(',') {
        let leading = part.len() - part.trim_start().len();
        if let Some(url) = part.trim().split_ascii_whitespace().next() {
            if !url.is_empty() {
                out.push((offset + leading, url));
            }
        }
        offset += part.len() + 1;
    }
    out
}

fn unescape_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
}
