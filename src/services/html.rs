//! Regex-based extraction of the page features analysis units read.

use crate::models::{Image, Link, Snapshot};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use url::Url;

/// Caps on how much of a page is kept in a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub max_links: usize,
    pub max_images: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_links: 200,
            max_images: 100,
        }
    }
}

struct Patterns {
    title: Regex,
    meta: Regex,
    heading: Regex,
    image: Regex,
    anchor: Regex,
    ld_json: Regex,
    invisible: Regex,
    comment: Regex,
    tag: Regex,
    attr: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static extraction pattern");
        Patterns {
            title: re(r"(?is)<title[^>]*>(.*?)</title>"),
            meta: re(r"(?is)<meta\s[^>]*>"),
            heading: re(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>"),
            image: re(r"(?is)<img\s[^>]*>"),
            anchor: re(r"(?is)<a\s([^>]*)>(.*?)</a\s*>"),
            ld_json: re(
                r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script\s*>"#,
            ),
            invisible: re(r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>|<noscript[^>]*>.*?</noscript\s*>"),
            comment: re(r"(?s)<!--.*?-->"),
            tag: re(r"(?s)<[^>]+>"),
            attr: re(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#),
            whitespace: re(r"\s+"),
        }
    })
}

/// Attribute value from a single tag, case-insensitive on the name.
fn attr(tag: &str, name: &str) -> Option<String> {
    patterns().attr.captures_iter(tag).find_map(|c| {
        if c[1].eq_ignore_ascii_case(name) {
            c.get(2).or_else(|| c.get(3)).map(|m| decode_entities(m.as_str()))
        } else {
            None
        }
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Strip tags, decode entities and collapse whitespace.
fn visible_text(fragment: &str) -> String {
    let p = patterns();
    let without_tags = p.tag.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    p.whitespace.replace_all(decoded.trim(), " ").into_owned()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Build a snapshot from a fetched HTML document.
pub fn parse_page(
    url: &str,
    status_code: u16,
    html: &str,
    load_time_seconds: f64,
    limits: ExtractLimits,
) -> Snapshot {
    let p = patterns();
    let base = Url::parse(url).ok();
    let document = p.comment.replace_all(html, "");
    let html_len = html.len();
    let html: &str = &document;

    let title = p
        .title
        .captures(html)
        .map(|c| visible_text(&c[1]))
        .and_then(non_empty);

    let mut meta_description = None;
    let mut meta_keywords = None;
    for m in p.meta.find_iter(html) {
        let tag = m.as_str();
        let name = attr(tag, "name").or_else(|| attr(tag, "property"));
        let content = attr(tag, "content");
        match (name.as_deref().map(str::to_ascii_lowercase).as_deref(), content) {
            (Some("description"), Some(c)) if meta_description.is_none() => {
                meta_description = non_empty(c.trim().to_string())
            }
            (Some("keywords"), Some(c)) if meta_keywords.is_none() => {
                meta_keywords = non_empty(c.trim().to_string())
            }
            _ => {}
        }
    }

    let mut headings: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for c in p.heading.captures_iter(html) {
        let text = visible_text(&c[2]);
        if !text.is_empty() {
            headings.entry(format!("h{}", &c[1])).or_default().push(text);
        }
    }

    let images = p
        .image
        .find_iter(html)
        .filter_map(|m| {
            let tag = m.as_str();
            let src = attr(tag, "src")?;
            Some(Image {
                src: resolve(base.as_ref(), &src),
                alt: attr(tag, "alt").unwrap_or_default().trim().to_string(),
            })
        })
        .take(limits.max_images)
        .collect();

    let links = p
        .anchor
        .captures_iter(html)
        .filter_map(|c| {
            let href = attr(&c[1], "href")?;
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                return None;
            }
            Some(Link {
                href: resolve(base.as_ref(), href),
                text: visible_text(&c[2]),
            })
        })
        .take(limits.max_links)
        .collect();

    let structured_data = p
        .ld_json
        .captures_iter(html)
        .filter_map(|c| serde_json::from_str::<Value>(c[1].trim()).ok())
        .collect();

    let body = p.invisible.replace_all(html, " ");
    let text = visible_text(&body);

    Snapshot {
        url: url.to_string(),
        status_code,
        title,
        meta_description,
        meta_keywords,
        headings,
        images,
        links,
        structured_data,
        text,
        content_length: html_len,
        load_time_seconds,
        fetched_at: Utc::now(),
    }
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    }
}
