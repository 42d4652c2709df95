use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

/// One searchable page or navigation link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    /// Manual tags. Matched as a set; kept in the order supplied.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PageLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<f64>,
}

impl SearchRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: String::new(),
            headings: Vec::new(),
            keywords: Vec::new(),
            links: Vec::new(),
            last_modified: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// A record built from a navigation link only; nothing was fetched for it.
    pub fn is_stub(&self) -> bool {
        self.content.is_empty() && self.headings.is_empty()
    }

    /// Lowercased `title content keywords...`, the text the substring matcher scans.
    pub fn haystack(&self) -> String {
        let mut text =
            String::with_capacity(self.title.len() + self.content.len() + 2 + self.keywords.len() * 8);
        text.push_str(&self.title);
        text.push(' ');
        text.push_str(&self.content);
        text.push(' ');
        text.push_str(&self.keywords.join(" "));
        fold_case(&text)
    }
}

/// Lowercases one char, folding final sigma into `σ` so a char-by-char fold and a
/// whole-string fold agree.
pub fn fold_char(ch: char) -> impl Iterator<Item = char> {
    ch.to_lowercase().map(|lower| if lower == 'ς' { 'σ' } else { lower })
}

pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(fold_char).collect()
}
