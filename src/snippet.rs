//! Bounded excerpts around the first query hit, and query highlighting.

use askama::{Html as HtmlEscaper, MarkupDisplay};
use regex::RegexBuilder;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::record::{fold_case, fold_char};

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// The window of content, without ellipsis markers.
    pub body: String,
    pub leading_ellipsis: bool,
    pub trailing_ellipsis: bool,
    /// Whether the query occurs in the content at all.
    pub found: bool,
}

impl Excerpt {
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.body.len() + 2 * ELLIPSIS.len());
        if self.leading_ellipsis {
            text.push_str(ELLIPSIS);
        }
        text.push_str(&self.body);
        if self.trailing_ellipsis {
            text.push_str(ELLIPSIS);
        }
        text
    }
}

/// Char index of the first case-insensitive occurrence of `query` in `content`.
pub fn find_ignore_case(content: &str, query: &str) -> Option<usize> {
    let needle = fold_case(query);
    if needle.is_empty() {
        return Some(0);
    }
    let mut lowered = String::with_capacity(content.len());
    // Owning char index for every byte of `lowered`.
    let mut origin = Vec::with_capacity(content.len());
    for (char_index, ch) in content.chars().enumerate() {
        let before = lowered.len();
        lowered.extend(fold_char(ch));
        origin.resize(origin.len() + (lowered.len() - before), char_index);
    }
    lowered.find(&needle).map(|byte| origin[byte])
}

pub fn excerpt(content: &str, query: &str, config: &SearchConfig) -> Excerpt {
    let total = content.chars().count();
    let take = |start: usize, end: usize| -> String {
        content.chars().skip(start).take(end - start).collect()
    };
    match find_ignore_case(content, query) {
        Some(hit) => {
            let start = hit.saturating_sub(config.snippet_lead);
            let end = total.min(start + config.snippet_len);
            Excerpt {
                body: take(start, end),
                leading_ellipsis: start > 0,
                trailing_ellipsis: end < total,
                found: true,
            }
        }
        None => {
            let end = total.min(config.snippet_len);
            Excerpt {
                body: take(0, end),
                leading_ellipsis: false,
                trailing_ellipsis: end < total,
                found: false,
            }
        }
    }
}

pub fn escape_html(text: &str) -> String {
    MarkupDisplay::new_unsafe(text, HtmlEscaper).to_string()
}

/// Wraps each case-insensitive hit of `query` in a highlight span, escaping all text.
///
/// The query is compiled as a pattern as typed unless `literal_highlight` is set, so
/// pattern syntax in a query changes what gets highlighted and may fail to compile.
pub fn highlight(text: &str, query: &str, config: &SearchConfig) -> Result<String> {
    let open = format!(r#"<span class="{}">"#, escape_html(&config.highlight_class));
    wrap_hits(text, query, config, &open, "</span>")
}

fn wrap_hits(
    text: &str,
    query: &str,
    config: &SearchConfig,
    open: &str,
    close: &str,
) -> Result<String> {
    if query.is_empty() {
        return Ok(escape_html(text));
    }
    let pattern = if config.literal_highlight {
        regex::escape(query)
    } else {
        query.to_string()
    };
    let matcher = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| SearchError::InvalidPattern {
            query: query.to_string(),
            source,
        })?;

    let mut out = String::with_capacity(text.len() + 48);
    let mut last = 0;
    for hit in matcher.find_iter(text) {
        if hit.as_str().is_empty() {
            continue;
        }
        out.push_str(&escape_html(&text[last..hit.start()]));
        out.push_str(open);
        out.push_str(&escape_html(hit.as_str()));
        out.push_str(close);
        last = hit.end();
    }
    out.push_str(&escape_html(&text[last..]));
    Ok(out)
}

/// Excerpt rendered as HTML; highlighted only when the query occurs in the content.
pub fn snippet(content: &str, query: &str, config: &SearchConfig) -> Result<String> {
    if content.is_empty() {
        return Ok(String::new());
    }
    let excerpt = excerpt(content, query, config);
    if excerpt.found {
        highlight(&excerpt.text(), query, config)
    } else {
        Ok(escape_html(&excerpt.text()))
    }
}
