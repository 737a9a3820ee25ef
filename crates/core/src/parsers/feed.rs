//! Atom/RSS feed link discovery (§4.4 "Discovery", §4.5 "Full responses").
//! Both dialects share enough element shape (`link`, `enclosure`) that one
//! event loop covers them, the same way `sitemap::parse` covers a plain
//! sitemap and a sitemap index in one pass. Feeds aren't rewritten by link
//! conversion, so no byte offsets are tracked here.

use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use url::Url;

pub fn parse(bytes: &[u8], base: &Url) -> Vec<Url> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = quick_xml::Reader::from_str(&text);

    let mut links = Vec::new();
    let mut in_link_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"link" => push_attr(e, b"href", base, &mut links),
                b"enclosure" | b"content" => push_attr(e, b"url", base, &mut links),
                _ => {}
            },
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"link" => {
                    if attr(e, b"href").is_some() {
                        push_attr(e, b"href", base, &mut links);
                    } else {
                        in_link_text = true;
                    }
                }
                b"enclosure" | b"content" => push_attr(e, b"url", base, &mut links),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_link_text {
                    if let Ok(text) = e.unescape() {
                        if let Ok(url) = base.join(text.trim()) {
                            if matches!(url.scheme(), "http" | "https") {
                                links.push(url);
                            }
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"link" {
                    in_link_text = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("failed to parse feed xml: {e}");
                break;
            }
            _ => {}
        }
    }

    links
}

fn attr(tag: &BytesStart, name: &[u8]) -> Option<String> {
    tag.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn push_attr(tag: &BytesStart, name: &[u8], base: &Url, out: &mut Vec<Url>) {
    let Some(value) = attr(tag, name) else { return };
    if let Ok(url) = base.join(&value) {
        if matches!(url.scheme(), "http" | "https") {
            out.push(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://a.com/feed.xml").unwrap()
    }

    #[test]
    fn reads_atom_self_closing_link_href() {
        let xml = r#"<feed><entry><link href="http://a.com/post-1" rel="alternate"/></entry></feed>"#;
        let links = parse(xml.as_bytes(), &base());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "http://a.com/post-1");
    }

    #[test]
    fn reads_rss_link_element_text() {
        let xml = r#"<rss><channel><item><link>http://a.com/post-2</link></item></channel></rss>"#;
        let links = parse(xml.as_bytes(), &base());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "http://a.com/post-2");
    }

    #[test]
    fn reads_enclosure_url_attribute() {
        let xml = r#"<rss><channel><item><enclosure url="http://a.com/audio.mp3" type="audio/mpeg"/></item></channel></rss>"#;
        let links = parse(xml.as_bytes(), &base());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "http://a.com/audio.mp3");
    }

    #[test]
    fn resolves_relative_link_against_feed_url() {
        let xml = r#"<rss><channel><item><link>/post-3</link></item></channel></rss>"#;
        let links = parse(xml.as_bytes(), &base());
        assert_eq!(links[0].as_str(), "http://a.com/post-3");
    }
}
