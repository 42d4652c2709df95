//! Text and outline extraction from parsed HTML pages.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::record::{Heading, PageLink};

static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static HEADINGS: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4, h5, h6"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static WITH_ID: Lazy<Selector> = Lazy::new(|| selector("[id]"));
static META_KEYWORDS: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="keywords"]"#));

const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];
pub const UNTITLED: &str = "Untitled";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// `<title>`, then the first `<h1>`, then [`UNTITLED`].
pub fn page_title(document: &Html) -> String {
    [&*TITLE, &*H1]
        .into_iter()
        .filter_map(|sel| document.select(sel).next())
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Body text with script and style content dropped, whitespace collapsed.
pub fn visible_text(document: &Html) -> String {
    let mut raw = String::new();
    match document.select(&BODY).next() {
        Some(body) => push_visible_text(body, &mut raw),
        None => push_visible_text(document.root_element(), &mut raw),
    }
    collapse_whitespace(&raw)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_ELEMENTS.contains(&child_element.value().name()) {
                push_visible_text(child_element, out);
            }
        }
    }
}

/// Headings in document order. Missing ids stay empty unless `assign_ids` is set,
/// in which case they become `heading-{position}`, skipping ids the page already uses.
pub fn headings(document: &Html, assign_ids: bool) -> Vec<Heading> {
    let mut taken: HashSet<String> = document
        .select(&WITH_ID)
        .filter_map(|element| element.value().attr("id"))
        .map(|id| id.trim().to_string())
        .collect();
    document
        .select(&HEADINGS)
        .enumerate()
        .map(|(position, element)| {
            let level = heading_level(element.value().name());
            let id = match element.value().attr("id").map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ if assign_ids => unique_heading_id(position, &mut taken),
                _ => String::new(),
            };
            Heading {
                level,
                text: element_text(element),
                id,
            }
        })
        .collect()
}

pub fn heading_id(position: usize) -> String {
    format!("heading-{position}")
}

/// `heading-{position}`, or `heading-{position}-{n}` when that is taken; the result is
/// added to `taken`.
pub fn unique_heading_id(position: usize, taken: &mut HashSet<String>) -> String {
    let base = heading_id(position);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn heading_level(name: &str) -> u8 {
    name.strip_prefix('h')
        .and_then(|digit| digit.parse().ok())
        .filter(|level| (1..=6).contains(level))
        .unwrap_or(6)
}

/// Every `<a href>` whose target is neither absolute http(s) nor a fragment.
pub fn internal_links(document: &Html) -> Vec<PageLink> {
    document
        .select(&ANCHORS)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if href.starts_with("http") || href.starts_with('#') {
                return None;
            }
            Some(PageLink {
                url: href.to_string(),
                text: element_text(anchor),
            })
        })
        .collect()
}

/// Comma separated `<meta name="keywords">` values, trimmed, blanks dropped.
pub fn meta_keywords(document: &Html) -> Vec<String> {
    document
        .select(&META_KEYWORDS)
        .filter_map(|meta| meta.value().attr("content"))
        .flat_map(|content| content.split(','))
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!DOCTYPE html>
<html><head><title>  Romans  </title>
<meta name="keywords" content="grace, faith,, law">
<style>.x { color: red }</style></head>
<body>
  <h1 id="top">Romans 1</h1>
  <p>Paul, a   servant of <b>Christ</b> Jesus.</p>
  <script>var hidden = "not visible";</script>
  <h2>Greeting</h2>
  <a href="/gal.html">Galatians</a> <a href="https://example.com">Out</a> <a href="#top">Top</a>
</body></html>"##;

    #[test]
    fn title_prefers_title_element() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(page_title(&doc), "Romans");
    }

    #[test]
    fn title_falls_back_to_h1_then_untitled() {
        let doc = Html::parse_document("<body><h1>Acts</h1></body>");
        assert_eq!(page_title(&doc), "Acts");
        let doc = Html::parse_document("<body><p>nothing</p></body>");
        assert_eq!(page_title(&doc), UNTITLED);
    }

    #[test]
    fn visible_text_skips_script_and_style() {
        let doc = Html::parse_document(PAGE);
        let text = visible_text(&doc);
        assert!(text.starts_with("Romans 1 Paul, a servant of Christ Jesus."));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn headings_keep_order_and_assign_ids() {
        let doc = Html::parse_document(PAGE);
        let assigned = headings(&doc, true);
        assert_eq!(assigned.len(), 2);
        assert_eq!((assigned[0].level, assigned[0].id.as_str()), (1, "top"));
        assert_eq!((assigned[1].level, assigned[1].id.as_str()), (2, "heading-1"));
        let raw = headings(&doc, false);
        assert_eq!(raw[1].id, "");
    }

    #[test]
    fn assigned_heading_ids_avoid_existing_ids() {
        let doc = Html::parse_document(
            r#"<body><h1>First</h1><h2 id="heading-1">Second</h2><h2>Third</h2>
<p id="heading-2">note</p><h3>Fourth</h3></body>"#,
        );
        let ids: Vec<_> = headings(&doc, true).into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["heading-0", "heading-1", "heading-2-2", "heading-3"]);
    }

    #[test]
    fn internal_links_skip_external_and_fragments() {
        let doc = Html::parse_document(PAGE);
        let links = internal_links(&doc);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "/gal.html");
        assert_eq!(links[0].text, "Galatians");
    }

    #[test]
    fn meta_keywords_are_split_and_trimmed() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(meta_keywords(&doc), vec!["grace", "faith", "law"]);
    }
}
