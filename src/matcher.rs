use crate::config::SearchConfig;
use crate::error::Result;
use crate::index::SearchIndex;
use crate::record::{self, SearchRecord};
use crate::snippet;

/// Matching strategy used by a search session.
///
/// A session falls back to [`SubstringMatcher`] unless another implementation is
/// handed to it; a replacement owns ordering, truncation, snippets and highlighting.
pub trait Matcher {
    fn find<'a>(&self, query: &str, index: &'a SearchIndex) -> Vec<&'a SearchRecord>;

    fn highlight(&self, text: &str, query: &str) -> Result<String>;

    fn snippet(&self, content: &str, query: &str) -> Result<String>;
}

/// Case-insensitive literal containment over `title content keywords`, in index order.
#[derive(Debug, Clone, Default)]
pub struct SubstringMatcher {
    config: SearchConfig,
}

impl SubstringMatcher {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

impl Matcher for SubstringMatcher {
    fn find<'a>(&self, query: &str, index: &'a SearchIndex) -> Vec<&'a SearchRecord> {
        let needle = record::fold_case(query);
        index
            .iter()
            .filter(|record| record.haystack().contains(&needle))
            .take(self.config.max_results)
            .collect()
    }

    fn highlight(&self, text: &str, query: &str) -> Result<String> {
        snippet::highlight(text, query, &self.config)
    }

    fn snippet(&self, content: &str, query: &str) -> Result<String> {
        snippet::snippet(content, query, &self.config)
    }
}
