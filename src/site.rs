//! Whole-site indexer producing the precomputed `search-index.json` that pages load.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use askama::Template;
use scraper::Html;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::extract;
use crate::index::SearchIndex;
use crate::record::{self, SearchRecord};

/// Study terms tagged as keywords whenever they appear in a page's text.
pub const STUDY_TERMS: &[&str] = &[
    "bible",
    "scripture",
    "gospel",
    "testament",
    "christian",
    "jesus",
    "christ",
    "god",
    "lord",
    "prayer",
    "faith",
    "salvation",
    "grace",
    "love",
    "peace",
    "forgiveness",
    "repentance",
    "baptism",
    "communion",
    "church",
    "worship",
];

const PAGE_EXTENSIONS: &[&str] = &["htm", "html"];
pub const JS_GLOBAL: &str = "window.BibleTextsSearchIndex";
pub const MATCHER_GLOBAL: &str = "window.BibleTextsSearch";

pub struct SiteIndexer {
    source_dir: PathBuf,
}

impl SiteIndexer {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// Indexes every `.htm`/`.html` file below the source directory, in path order.
    pub fn build(&self) -> Result<SearchIndex> {
        if !self.source_dir.is_dir() {
            return Err(SearchError::io(
                &self.source_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        info!(source = %self.source_dir.display(), "Building site search index");
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.source_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_page(entry.path()) {
                continue;
            }
            match self.index_file(entry.path()) {
                Ok(record) => {
                    debug!(title = %record.title, url = %record.url, "indexed page");
                    records.push(record);
                }
                Err(err) => warn!(path = %entry.path().display(), error = %err, "could not index page"),
            }
        }
        info!(pages = records.len(), "Site search index built");
        Ok(SearchIndex::precomputed(records))
    }

    fn index_file(&self, path: &Path) -> Result<SearchRecord> {
        let bytes = fs::read(path).map_err(|err| SearchError::io(path, err))?;
        let html = String::from_utf8_lossy(&bytes);
        let url = relative_url(&self.source_dir, path);
        let mut record = page_record(&html, url);
        record.last_modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|age| age.as_secs_f64());
        Ok(record)
    }
}

/// Full record for one page: outline, internal links and keywords included.
pub fn page_record(html: &str, url: impl Into<String>) -> SearchRecord {
    let document = Html::parse_document(html);
    let content = extract::visible_text(&document);
    let mut record = SearchRecord::new(extract::page_title(&document), url);
    record.headings = extract::headings(&document, false);
    record.links = extract::internal_links(&document);
    record.keywords = keywords(&document, &record.title, &content);
    record.content = content;
    record
}

/// Study terms are looked up in the title as well as the body text.
fn keywords(document: &Html, title: &str, content: &str) -> Vec<String> {
    let lowered = record::fold_case(&format!("{title} {content}"));
    let mut keywords: BTreeSet<String> = extract::meta_keywords(document).into_iter().collect();
    keywords.extend(
        STUDY_TERMS
            .iter()
            .filter(|term| lowered.contains(*term))
            .map(|term| term.to_string()),
    );
    keywords.into_iter().collect()
}

fn is_page(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn relative_url(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn write_json(index: &SearchIndex, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(index.records())?;
    fs::write(path, json).map_err(|err| SearchError::io(path, err))?;
    info!(path = %path.display(), records = index.len(), "Search index saved");
    Ok(())
}

#[derive(Template)]
#[template(
    source = r##"{{ index_global }} = {{ index_json|safe }};

(function () {
  'use strict';

  var config = {
    minQueryLength: {{ min_query_len }},
    maxResults: {{ max_results }},
    snippetLength: {{ snippet_len }},
    snippetLead: {{ snippet_lead }},
    highlightClass: {{ highlight_class|safe }},
    literalHighlight: {{ literal_highlight }}
  };

  function escapePattern(query) {
    return query.replace(/[.*+?^$()|[\]\\]/g, '\\$&').replace(/[{}]/g, '\\$&');
  }

  function performSearch(query) {
    query = (query || '').trim();
    if (query.length < config.minQueryLength) return [];
    var needle = query.toLowerCase();
    return {{ index_global }}.filter(function (item) {
      var text = [item.title, item.content || '', (item.keywords || []).join(' ')].join(' ');
      return text.toLowerCase().indexOf(needle) !== -1;
    }).slice(0, config.maxResults);
  }

  function highlightText(text, query) {
    if (!query) return text;
    var pattern = config.literalHighlight ? escapePattern(query) : query;
    var regex = new RegExp('(' + pattern + ')', 'gi');
    return text.replace(regex, '<span class="' + config.highlightClass + '">$1</span>');
  }

  function getSnippet(content, query) {
    if (!content) return '';
    var hit = content.toLowerCase().indexOf(query.toLowerCase());
    if (hit === -1) {
      var head = content.substring(0, config.snippetLength);
      return content.length > config.snippetLength ? head + '...' : head;
    }
    var start = Math.max(0, hit - config.snippetLead);
    var end = Math.min(content.length, start + config.snippetLength);
    var snippet = content.substring(start, end);
    if (start > 0) snippet = '...' + snippet;
    if (end < content.length) snippet += '...';
    return highlightText(snippet, query);
  }

  {{ matcher_global }} = {
    performSearch: performSearch,
    highlightText: highlightText,
    getSnippet: getSnippet,
    getIndex: function () { return {{ index_global }}; }
  };
})();
"##,
    ext = "txt"
)]
struct SearchScript<'a> {
    index_global: &'a str,
    matcher_global: &'a str,
    index_json: &'a str,
    min_query_len: usize,
    max_results: usize,
    snippet_len: usize,
    snippet_lead: usize,
    /// JSON string literal, quotes included.
    highlight_class: String,
    literal_highlight: bool,
}

/// Script assigning the index to its page global, followed by the default matcher
/// object pages call into when no other matcher is installed.
pub fn write_js(index: &SearchIndex, config: &SearchConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(index.records())?;
    let script = SearchScript {
        index_global: JS_GLOBAL,
        matcher_global: MATCHER_GLOBAL,
        index_json: &json,
        min_query_len: config.min_query_len,
        max_results: config.max_results,
        snippet_len: config.snippet_len,
        snippet_lead: config.snippet_lead,
        highlight_class: serde_json::to_string(&config.highlight_class)?,
        literal_highlight: config.literal_highlight,
    }
    .render()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| SearchError::io(parent, err))?;
    }
    fs::write(path, script).map_err(|err| SearchError::io(path, err))?;
    info!(path = %path.display(), "Search index script written");
    Ok(())
}
