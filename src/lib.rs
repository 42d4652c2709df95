pub mod a11y;
pub mod config;
mod error;
mod extract;
pub mod index;
pub mod matcher;
pub mod reading;
pub mod record;
pub mod session;
pub mod site;
pub mod snippet;
pub mod storage;
#[cfg(feature = "web")]
pub mod web;

pub use config::{QuickLink, ReadingDefaults, SearchConfig, SiteConfig};
pub use error::{Result, SearchError};
pub use index::{PageContext, PageScan, SearchIndex};
pub use matcher::{Matcher, SubstringMatcher};
pub use reading::{PageChrome, ReadingCommand, ReadingSession, Slider};
pub use record::{Heading, PageLink, SearchRecord};
pub use session::{
    KeyEvent, ResultsPanel, SearchCommand, SearchHit, SearchSession, SearchState, command_for_key,
};
pub use site::SiteIndexer;
pub use storage::{FileStorage, MemoryStorage, Storage};

/// Everything one page load owns. Each controller stands alone; they only share
/// the page they were built from.
pub struct PageSession<S: Storage> {
    pub search: SearchSession,
    pub reading: ReadingSession<S>,
    pub nav: a11y::NavToggle,
    pub toc: Vec<reading::TocEntry>,
}

impl<S: Storage> PageSession<S> {
    /// Builds the controllers for one page. `precomputed` and `matcher` are the
    /// optional site-wide index and matching strategy.
    pub fn new(
        page_html: &str,
        context: &PageContext,
        precomputed: Option<Vec<SearchRecord>>,
        matcher: Option<Box<dyn Matcher>>,
        storage: S,
        config: &SiteConfig,
    ) -> Self {
        let document = scraper::Html::parse_document(page_html);
        let toc = reading::table_of_contents(&extract::headings(&document, true));
        let index = SearchIndex::resolve(precomputed, page_html, context);
        let search = SearchSession::new(index, config.search.clone(), matcher)
            .with_quick_links(config.quick_links.clone());
        Self {
            search,
            reading: ReadingSession::new(storage, config.reading),
            nav: a11y::NavToggle::default(),
            toc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const PAGE: &str = r#"<html><head><title>Genesis</title></head><body>
<nav><a href="/ex.html">Exodus</a></nav>
<main id="main"><h1>Genesis 1</h1><p>In the beginning God created the heavens</p><h2>Day one</h2></main>
</body></html>"#;

    #[test]
    fn page_session_wires_independent_controllers() {
        let mut page = PageSession::new(
            PAGE,
            &PageContext::new("/gen.html"),
            None,
            None,
            MemoryStorage::new(),
            &SiteConfig::default(),
        );
        assert_eq!(page.search.index().len(), 2);
        assert_eq!(page.toc.len(), 2);
        assert_eq!(page.toc[1].anchor, "heading-1");

        let t0 = Instant::now();
        page.search.dispatch(SearchCommand::Open, t0).unwrap();
        page.search
            .dispatch(SearchCommand::Input("exodus".into()), t0)
            .unwrap();
        page.search
            .dispatch(SearchCommand::Tick, t0 + Duration::from_millis(300))
            .unwrap();
        let panel = page.search.panel().unwrap();
        let urls: Vec<_> = panel.hits().iter().map(|hit| hit.url.as_str()).collect();
        assert_eq!(urls, vec!["/gen.html", "/ex.html"]);
        assert_eq!(panel.hits()[1].snippet_html, "");

        page.reading.dispatch(ReadingCommand::ToggleDarkMode);
        page.nav.toggle(page.reading.chrome_mut());
        let chrome = page.reading.chrome();
        assert!(chrome.has_class(reading::DARK_MODE_CLASS));
        assert!(chrome.has_class(a11y::NAV_OPEN_CLASS));
        assert!(page.search.is_open());
    }
}
