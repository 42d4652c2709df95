use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed search index: {0}")]
    Json(#[from] serde_json::Error),

    /// The query was used as a highlight pattern and did not compile.
    #[error("query {query:?} is not a valid highlight pattern: {source}")]
    InvalidPattern {
        query: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to walk site directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to render panel: {0}")]
    Render(#[from] askama::Error),
}

impl SearchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::Io {
            path: path.into(),
            source,
        }
    }
}
