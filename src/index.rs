use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, SearchError};
use crate::extract;
use crate::record::SearchRecord;

static NAV_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("nav a[href]").expect("static selector is valid CSS"));

/// Ordered records searched for the current page session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchIndex {
    records: Vec<SearchRecord>,
}

impl SearchIndex {
    /// Uses an externally supplied list as-is.
    pub fn precomputed(records: Vec<SearchRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let records: Vec<SearchRecord> = serde_json::from_str(raw)?;
        Ok(Self::precomputed(records))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| SearchError::io(path, err))?;
        let index = Self::from_json(&raw)?;
        info!(path = %path.display(), records = index.len(), "Loaded precomputed search index");
        Ok(index)
    }

    /// A precomputed list wins; otherwise fall back to scanning the current page.
    pub fn resolve(precomputed: Option<Vec<SearchRecord>>, page: &str, context: &PageContext) -> Self {
        match precomputed {
            Some(records) => Self::precomputed(records),
            None => PageScan::scan(page, context),
        }
    }

    pub fn records(&self) -> &[SearchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a SearchIndex {
    type Item = &'a SearchRecord;
    type IntoIter = std::slice::Iter<'a, SearchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Where the scanned page lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub path: String,
    /// Absolute links are same-site only when their host matches this origin.
    pub origin: Option<Url>,
}

impl PageContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    fn is_same_site(&self, href: &str) -> bool {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return false;
        }
        let absolute = if href.starts_with("//") {
            match &self.origin {
                Some(origin) => origin.join(href),
                None => return false,
            }
        } else {
            Url::parse(href)
        };
        match absolute {
            Ok(url) => {
                matches!(url.scheme(), "http" | "https")
                    && self
                        .origin
                        .as_ref()
                        .is_some_and(|origin| origin.host_str() == url.host_str())
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }
}

/// Degenerate index built from the page being viewed and its navigation links.
pub struct PageScan;

impl PageScan {
    pub fn scan(html: &str, context: &PageContext) -> SearchIndex {
        let document = Html::parse_document(html);
        let mut page = SearchRecord::new(extract::page_title(&document), context.path.clone())
            .with_content(extract::visible_text(&document));
        page.headings = extract::headings(&document, true);

        let mut records = vec![page];
        for anchor in document.select(&NAV_LINKS) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !context.is_same_site(href) {
                continue;
            }
            records.push(SearchRecord::new(extract::element_text(anchor), href));
        }
        debug!(
            path = %context.path,
            stubs = records.len() - 1,
            "Built search index from current page"
        );
        SearchIndex::precomputed(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><head><title>Genesis</title></head><body>
<nav class="main-nav">
  <a href="/index.html">Home</a>
  <a href="exodus.html"> Exodus </a>
  <a href="https://bibletexts.com/lev.html">Leviticus</a>
  <a href="https://elsewhere.org/">Elsewhere</a>
  <a href="mailto:editor@bibletexts.com">Mail</a>
  <a href="#main">Skip</a>
</nav>
<main id="main"><h1>Genesis 1</h1><p>In the beginning God created the heavens</p>
<h2 id="v2">Verse 2</h2></main>
<footer><a href="/about.html">About</a></footer>
</body></html>"##;

    fn context() -> PageContext {
        PageContext::new("/gen.html").with_origin(Url::parse("https://bibletexts.com/").unwrap())
    }

    #[test]
    fn scan_builds_page_record_then_nav_stubs() {
        let index = PageScan::scan(PAGE, &context());
        let records = index.records();
        assert_eq!(records[0].title, "Genesis");
        assert_eq!(records[0].url, "/gen.html");
        assert!(records[0].content.contains("In the beginning God created the heavens"));
        let ids: Vec<_> = records[0].headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["heading-0", "v2"]);

        let stubs: Vec<_> = records[1..]
            .iter()
            .map(|r| (r.title.as_str(), r.url.as_str()))
            .collect();
        assert_eq!(
            stubs,
            vec![
                ("Home", "/index.html"),
                ("Exodus", "exodus.html"),
                ("Leviticus", "https://bibletexts.com/lev.html"),
            ]
        );
        assert!(records[1..].iter().all(SearchRecord::is_stub));
    }

    #[test]
    fn absolute_links_need_known_origin() {
        let index = PageScan::scan(PAGE, &PageContext::new("/gen.html"));
        assert!(index.iter().all(|r| !r.url.starts_with("https://")));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn page_without_nav_yields_single_record() {
        let index = PageScan::scan("<p>Just text</p>", &PageContext::new("/solo.html"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.records()[0].title, "Untitled");
        assert_eq!(index.records()[0].content, "Just text");
    }

    #[test]
    fn precomputed_index_wins_over_page_scan() {
        let records = vec![SearchRecord::new("Psalms", "/ps.html")];
        let index = SearchIndex::resolve(Some(records.clone()), PAGE, &context());
        assert_eq!(index.records(), records.as_slice());
        let scanned = SearchIndex::resolve(None, PAGE, &context());
        assert_eq!(scanned.records()[0].url, "/gen.html");
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(matches!(
            SearchIndex::from_json("{not json"),
            Err(SearchError::Json(_))
        ));
        let index = SearchIndex::from_json(r#"[{"title":"A","url":"/a"},{"title":"A","url":"/a"}]"#)
            .unwrap();
        assert_eq!(index.len(), 2);
    }
}
