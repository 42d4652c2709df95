use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Tunables for matching, snippets, and the search input debounce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Queries shorter than this (in characters, after trimming) never reach a matcher.
    pub min_query_len: usize,
    /// Cap applied after filtering by the substring matcher.
    pub max_results: usize,
    #[serde(with = "millis")]
    pub debounce: Duration,
    pub snippet_len: usize,
    /// Characters kept before the first occurrence of the query.
    pub snippet_lead: usize,
    pub highlight_class: String,
    /// Escape the query before compiling it as a highlight pattern.
    pub literal_highlight: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_len: 2,
            max_results: 50,
            debounce: Duration::from_millis(300),
            snippet_len: 150,
            snippet_lead: 50,
            highlight_class: "search-highlight".to_string(),
            literal_highlight: false,
        }
    }
}

/// Entry of the default panel shown before a query is long enough to search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickLink {
    pub label: String,
    pub url: String,
}

impl QuickLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

pub fn default_quick_links() -> Vec<QuickLink> {
    vec![
        QuickLink::new("Home", "/index.html"),
        QuickLink::new("Bible Study Resources", "/resources.html"),
        QuickLink::new("Translations", "/translations.html"),
        QuickLink::new("Commentary", "/commentary.html"),
        QuickLink::new("Bookmarks", "/bookmarks.html"),
    ]
}

/// Starting values for the reading sliders when storage holds nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingDefaults {
    pub font_size: f64,
    pub line_height: f64,
    pub max_width: f64,
}

impl Default for ReadingDefaults {
    fn default() -> Self {
        Self {
            font_size: 18.0,
            line_height: 1.6,
            max_width: 800.0,
        }
    }
}

/// Everything a page session is configured with; loaded from an optional JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub search: SearchConfig,
    pub reading: ReadingDefaults,
    pub quick_links: Vec<QuickLink>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            reading: ReadingDefaults::default(),
            quick_links: default_quick_links(),
        }
    }
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| SearchError::io(path, err))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
