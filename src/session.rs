//! Search overlay controller: owns the index, the matcher and one debounce timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use askama::Template;
use serde::Serialize;
use tracing::debug;

use crate::config::{QuickLink, SearchConfig};
use crate::error::Result;
use crate::index::SearchIndex;
use crate::matcher::{Matcher, SubstringMatcher};

/// Single pending deadline, re-armed on every keystroke.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Clears and reports the deadline once `now` has reached it.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet_html: String,
}

/// What the overlay shows below the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultsPanel {
    QuickLinks {
        links: Vec<QuickLink>,
    },
    Loading {
        query: String,
    },
    Hits {
        query: String,
        hits: Vec<SearchHit>,
    },
    NoResults {
        query: String,
        quick_links: Vec<QuickLink>,
    },
}

impl ResultsPanel {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            ResultsPanel::Hits { hits, .. } => hits,
            _ => &[],
        }
    }

    pub fn render_html(&self) -> Result<String> {
        let empty: &[QuickLink] = &[];
        let view = match self {
            ResultsPanel::QuickLinks { links } => PanelTemplate {
                query: "",
                loading: false,
                no_results: false,
                hits: &[],
                quick_links: links,
            },
            ResultsPanel::Loading { query } => PanelTemplate {
                query,
                loading: true,
                no_results: false,
                hits: &[],
                quick_links: empty,
            },
            ResultsPanel::Hits { query, hits } => PanelTemplate {
                query,
                loading: false,
                no_results: false,
                hits,
                quick_links: empty,
            },
            ResultsPanel::NoResults { query, quick_links } => PanelTemplate {
                query,
                loading: false,
                no_results: true,
                hits: &[],
                quick_links,
            },
        };
        Ok(view.render()?)
    }
}

#[derive(Template)]
#[template(
    source = r#"<div class="search-results" aria-live="polite">
{% if loading %}
  <p class="search-loading">Searching for “{{ query }}”…</p>
{% endif %}
{% if no_results %}
  <div class="search-no-results">
    <p>No results found for “{{ query }}”.</p>
    <p>Try a different word or browse the pages below.</p>
  </div>
{% endif %}
{% if hits.len() > 0 %}
  <p class="search-count">{{ hits.len() }} result{% if hits.len() != 1 %}s{% endif %} for “{{ query }}”</p>
  <ul class="search-hit-list">
  {% for hit in hits %}
    <li class="search-hit">
      <a href="{{ hit.url }}" class="search-hit-title">{{ hit.title }}</a>
      {% if hit.snippet_html.len() > 0 %}<p class="search-snippet">{{ hit.snippet_html|safe }}</p>{% endif %}
    </li>
  {% endfor %}
  </ul>
{% endif %}
{% if quick_links.len() > 0 %}
  <div class="search-quick-links">
    <h3>Quick links</h3>
    <ul>
    {% for link in quick_links %}
      <li><a href="{{ link.url }}">{{ link.label }}</a></li>
    {% endfor %}
    </ul>
  </div>
{% endif %}
</div>"#,
    ext = "html"
)]
struct PanelTemplate<'a> {
    query: &'a str,
    loading: bool,
    no_results: bool,
    hits: &'a [SearchHit],
    quick_links: &'a [QuickLink],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Closed,
    /// Open with a query too short to search.
    Empty,
    Loading { query: String },
    Results { query: String, panel: ResultsPanel },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCommand {
    Open,
    Input(String),
    /// Time passed; fires the debounce if it is due.
    Tick,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    /// Focus is in an editable field, where `/` is just a character.
    pub in_text_field: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn in_text_field(mut self) -> Self {
        self.in_text_field = true;
        self
    }
}

/// Keyboard shortcuts: Ctrl/Cmd+K or `/` open the overlay, Escape closes it.
pub fn command_for_key(event: &KeyEvent, is_open: bool) -> Option<SearchCommand> {
    let key = event.key.as_str();
    if key == "Escape" {
        return is_open.then_some(SearchCommand::Close);
    }
    if is_open {
        return None;
    }
    let modified = event.ctrl || event.meta;
    match key {
        "k" | "K" if modified => Some(SearchCommand::Open),
        "/" if !modified && !event.in_text_field => Some(SearchCommand::Open),
        _ => None,
    }
}

pub struct SearchSession {
    index: Arc<SearchIndex>,
    config: SearchConfig,
    quick_links: Vec<QuickLink>,
    matcher: Box<dyn Matcher>,
    state: SearchState,
    query: String,
    debounce: Debounce,
}

impl SearchSession {
    /// Without a `matcher` the session uses [`SubstringMatcher`] with the same config.
    pub fn new(
        index: impl Into<Arc<SearchIndex>>,
        config: SearchConfig,
        matcher: Option<Box<dyn Matcher>>,
    ) -> Self {
        let matcher =
            matcher.unwrap_or_else(|| Box::new(SubstringMatcher::new(config.clone())));
        let debounce = Debounce::new(config.debounce);
        Self {
            index: index.into(),
            config,
            quick_links: crate::config::default_quick_links(),
            matcher,
            state: SearchState::Closed,
            query: String::new(),
            debounce,
        }
    }

    pub fn with_quick_links(mut self, links: Vec<QuickLink>) -> Self {
        self.quick_links = links;
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_open(&self) -> bool {
        self.state != SearchState::Closed
    }

    /// When the caller should next send [`SearchCommand::Tick`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn panel(&self) -> Option<ResultsPanel> {
        match &self.state {
            SearchState::Closed => None,
            SearchState::Empty => Some(self.quick_links_panel()),
            SearchState::Loading { query } => Some(ResultsPanel::Loading {
                query: query.clone(),
            }),
            SearchState::Results { panel, .. } => Some(panel.clone()),
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent, now: Instant) -> Result<bool> {
        match command_for_key(event, self.is_open()) {
            Some(command) => self.dispatch(command, now).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn dispatch(&mut self, command: SearchCommand, now: Instant) -> Result<()> {
        match command {
            SearchCommand::Open => {
                if !self.is_open() {
                    debug!("search opened");
                    self.state = SearchState::Empty;
                }
            }
            SearchCommand::Input(text) => {
                if !self.is_open() {
                    debug!("input ignored while search is closed");
                    return Ok(());
                }
                self.query = text;
                let query = self.query.trim().to_string();
                if self.is_short(&query) {
                    self.debounce.cancel();
                    self.state = SearchState::Empty;
                } else {
                    self.debounce.arm(now);
                    self.state = SearchState::Loading { query };
                }
            }
            SearchCommand::Tick => {
                if self.is_open() && self.debounce.fire(now) {
                    let query = self.query.trim().to_string();
                    let panel = self.search(&query)?;
                    self.state = match panel {
                        ResultsPanel::QuickLinks { .. } => SearchState::Empty,
                        panel => SearchState::Results { query, panel },
                    };
                }
            }
            SearchCommand::Close => {
                if self.is_open() {
                    debug!("search closed");
                }
                self.debounce.cancel();
                self.query.clear();
                self.state = SearchState::Closed;
            }
        }
        Ok(())
    }

    /// Runs one query immediately, without touching the overlay state.
    pub fn search(&self, query: &str) -> Result<ResultsPanel> {
        let query = query.trim();
        if self.is_short(query) {
            return Ok(self.quick_links_panel());
        }
        let records = self.matcher.find(query, &self.index);
        debug!(query, hits = records.len(), "search evaluated");
        if records.is_empty() {
            return Ok(ResultsPanel::NoResults {
                query: query.to_string(),
                quick_links: self.quick_links.clone(),
            });
        }
        let hits = records
            .into_iter()
            .map(|record| {
                Ok(SearchHit {
                    title: record.title.clone(),
                    url: record.url.clone(),
                    snippet_html: self.matcher.snippet(&record.content, query)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultsPanel::Hits {
            query: query.to_string(),
            hits,
        })
    }

    fn is_short(&self, query: &str) -> bool {
        query.chars().count() < self.config.min_query_len
    }

    fn quick_links_panel(&self) -> ResultsPanel {
        ResultsPanel::QuickLinks {
            links: self.quick_links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::record::SearchRecord;
    use std::cell::Cell;
    use std::rc::Rc;

    fn genesis_index() -> SearchIndex {
        SearchIndex::precomputed(vec![
            SearchRecord::new("Genesis", "/gen").with_content("In the beginning God created the heavens"),
            SearchRecord::new("Exodus", "/ex").with_content("These are the names"),
        ])
    }

    fn session() -> SearchSession {
        SearchSession::new(genesis_index(), SearchConfig::default(), None)
    }

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn opens_into_quick_links() {
        let mut session = session();
        let t0 = Instant::now();
        assert!(session.panel().is_none());
        session.dispatch(SearchCommand::Open, t0).unwrap();
        assert_eq!(session.state(), &SearchState::Empty);
        assert!(matches!(session.panel(), Some(ResultsPanel::QuickLinks { .. })));
    }

    #[test]
    fn debounce_delays_search_until_quiet() {
        let mut session = session();
        let t0 = Instant::now();
        session.dispatch(SearchCommand::Open, t0).unwrap();
        session.dispatch(SearchCommand::Input("beg".into()), t0).unwrap();
        assert!(matches!(session.state(), SearchState::Loading { .. }));

        session.dispatch(SearchCommand::Input("beginning".into()), ms(t0, 200)).unwrap();
        session.dispatch(SearchCommand::Tick, ms(t0, 400)).unwrap();
        assert!(matches!(session.state(), SearchState::Loading { .. }));
        assert_eq!(session.next_deadline(), Some(ms(t0, 500)));

        session.dispatch(SearchCommand::Tick, ms(t0, 500)).unwrap();
        let panel = session.panel().unwrap();
        assert_eq!(panel.hits().len(), 1);
        assert_eq!(panel.hits()[0].url, "/gen");
        assert!(panel.hits()[0]
            .snippet_html
            .contains(r#"<span class="search-highlight">beginning</span>"#));
        assert!(session.next_deadline().is_none());
    }

    #[test]
    fn short_query_never_reaches_matcher() {
        struct Counting(Rc<Cell<usize>>);
        impl Matcher for Counting {
            fn find<'a>(&self, _: &str, _: &'a SearchIndex) -> Vec<&'a SearchRecord> {
                self.0.set(self.0.get() + 1);
                Vec::new()
            }
            fn highlight(&self, text: &str, _: &str) -> Result<String> {
                Ok(text.to_string())
            }
            fn snippet(&self, content: &str, _: &str) -> Result<String> {
                Ok(content.to_string())
            }
        }

        let calls = Rc::new(Cell::new(0));
        let mut session = SearchSession::new(
            genesis_index(),
            SearchConfig::default(),
            Some(Box::new(Counting(calls.clone()))),
        );
        let t0 = Instant::now();
        session.dispatch(SearchCommand::Open, t0).unwrap();
        for (step, text) in ["", "g", " g ", "é"].into_iter().enumerate() {
            session
                .dispatch(SearchCommand::Input(text.into()), ms(t0, step as u64))
                .unwrap();
            session.dispatch(SearchCommand::Tick, ms(t0, 1_000)).unwrap();
            assert_eq!(session.state(), &SearchState::Empty);
        }
        assert!(matches!(session.search("g").unwrap(), ResultsPanel::QuickLinks { .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn clearing_below_threshold_cancels_pending_search() {
        let mut session = session();
        let t0 = Instant::now();
        session.dispatch(SearchCommand::Open, t0).unwrap();
        session.dispatch(SearchCommand::Input("be".into()), t0).unwrap();
        session.dispatch(SearchCommand::Input("b".into()), ms(t0, 50)).unwrap();
        assert!(session.next_deadline().is_none());
        session.dispatch(SearchCommand::Tick, ms(t0, 1_000)).unwrap();
        assert_eq!(session.state(), &SearchState::Empty);
    }

    #[test]
    fn no_results_panel_appends_quick_links() {
        let session = session();
        let panel = session.search("xyzzy").unwrap();
        match &panel {
            ResultsPanel::NoResults { query, quick_links } => {
                assert_eq!(query, "xyzzy");
                assert!(!quick_links.is_empty());
            }
            other => panic!("unexpected panel {other:?}"),
        }
        let html = panel.render_html().unwrap();
        let no_results = html.find("No results found").unwrap();
        let quick = html.find("Quick links").unwrap();
        assert!(no_results < quick);
    }

    #[test]
    fn close_clears_query_from_any_state() {
        let mut session = session();
        let t0 = Instant::now();
        session.dispatch(SearchCommand::Open, t0).unwrap();
        session.dispatch(SearchCommand::Input("genesis".into()), t0).unwrap();
        session.dispatch(SearchCommand::Close, ms(t0, 10)).unwrap();
        assert_eq!(session.state(), &SearchState::Closed);
        assert_eq!(session.query(), "");
        assert!(session.next_deadline().is_none());

        session.dispatch(SearchCommand::Input("ignored".into()), ms(t0, 20)).unwrap();
        assert_eq!(session.state(), &SearchState::Closed);
        assert_eq!(session.query(), "");
    }

    #[test]
    fn invalid_highlight_pattern_surfaces_error_and_keeps_state() {
        let mut session = session();
        let t0 = Instant::now();
        session.dispatch(SearchCommand::Open, t0).unwrap();
        session.dispatch(SearchCommand::Input("heavens(".into()), t0).unwrap();
        // The literal scan finds nothing, so no highlight runs.
        session.dispatch(SearchCommand::Tick, ms(t0, 300)).unwrap();
        assert!(matches!(
            session.state(),
            SearchState::Results { panel: ResultsPanel::NoResults { .. }, .. }
        ));

        let index = SearchIndex::precomputed(vec![
            SearchRecord::new("Paren", "/p").with_content("a note (see above)"),
        ]);
        let mut session = SearchSession::new(index, SearchConfig::default(), None);
        session.dispatch(SearchCommand::Open, t0).unwrap();
        session.dispatch(SearchCommand::Input("(see".into()), t0).unwrap();
        let err = session.dispatch(SearchCommand::Tick, ms(t0, 300)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidPattern { .. }));
        assert!(matches!(session.state(), SearchState::Loading { .. }));
    }

    #[test]
    fn keyboard_shortcuts_map_to_commands() {
        assert_eq!(
            command_for_key(&KeyEvent::new("k").with_ctrl(), false),
            Some(SearchCommand::Open)
        );
        assert_eq!(
            command_for_key(&KeyEvent::new("k").with_meta(), false),
            Some(SearchCommand::Open)
        );
        assert_eq!(command_for_key(&KeyEvent::new("/"), false), Some(SearchCommand::Open));
        assert_eq!(command_for_key(&KeyEvent::new("/").in_text_field(), false), None);
        assert_eq!(command_for_key(&KeyEvent::new("k"), false), None);
        assert_eq!(command_for_key(&KeyEvent::new("Escape"), true), Some(SearchCommand::Close));
        assert_eq!(command_for_key(&KeyEvent::new("Escape"), false), None);

        let mut session = session();
        let t0 = Instant::now();
        assert!(session.handle_key(&KeyEvent::new("/"), t0).unwrap());
        assert!(session.is_open());
        assert!(session.handle_key(&KeyEvent::new("Escape"), t0).unwrap());
        assert!(!session.is_open());
    }

    #[test]
    fn results_panel_renders_escaped_titles() {
        let index = SearchIndex::precomputed(vec![
            SearchRecord::new("Faith & <Works>", "/james").with_content("faith without works"),
        ]);
        let session = SearchSession::new(index, SearchConfig::default(), None);
        let html = session.search("faith").unwrap().render_html().unwrap();
        assert!(html.contains("Faith &amp; &lt;Works&gt;"));
        assert!(html.contains(r#"<span class="search-highlight">faith</span> without works"#));
        assert!(html.contains("1 result for"));
    }
}
