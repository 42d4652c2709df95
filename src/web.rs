use crate::{ResultsPanel, SearchError, SearchIndex, SearchSession, SiteConfig};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;

pub struct AppState {
    pub index: Arc<SearchIndex>,
    pub site: SiteConfig,
}

impl AppState {
    /// Per-request session sharing the loaded index.
    fn session(&self, limit: Option<usize>) -> SearchSession {
        let mut search = self.site.search.clone();
        if let Some(limit) = limit {
            search.max_results = limit.clamp(1, search.max_results.max(1));
        }
        SearchSession::new(Arc::clone(&self.index), search, None)
            .with_quick_links(self.site.quick_links.clone())
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    /// Directory served for every path the search routes do not claim.
    pub site_dir: PathBuf,
    pub site: SiteConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            site_dir: PathBuf::from("."),
            site: SiteConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig, index: SearchIndex) -> Result<(), WebError> {
    let pages = index.len();
    let state = Arc::new(AppState {
        index: Arc::new(index),
        site: config.site,
    });
    let router = build_router(state, config.site_dir.clone());
    info!(
        %config.addr,
        site = %config.site_dir.display(),
        pages,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidPattern { .. } => ApiError::bad_request(err.to_string()),
            other => {
                warn!(error = %other, "search request failed");
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState, site_dir: PathBuf) -> Router {
    Router::new()
        .route("/search", get(search_html))
        .route("/api/search", get(api_search))
        .route("/healthz", get(health))
        .with_state(state)
        .fallback_service(ServeDir::new(site_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "bibletexts-web",
        "pages": state.index.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

fn run_search(state: &AppState, params: &SearchParams) -> Result<ResultsPanel, ApiError> {
    let query = params.q.as_deref().unwrap_or_default();
    if params.limit == Some(0) {
        return Err(ApiError::bad_request("limit must be at least 1"));
    }
    Ok(state.session(params.limit).search(query)?)
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ResultsPanel>, ApiError> {
    run_search(&state, &params).map(Json)
}

#[derive(Template)]
#[template(
    source = r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{% if query.is_empty() %}Search{% else %}Search: {{ query }}{% endif %} • BibleTexts</title>
  </head>
  <body>
    <a class="skip-link" href="#search-main">Skip to search results</a>
    <main id="search-main" role="main">
      <form action="/search" method="get" role="search">
        <label for="search-input">Search the site</label>
        <input id="search-input" type="search" name="q" value="{{ query }}" autocomplete="off" />
        <button type="submit">Search</button>
      </form>
      {{ panel_html|safe }}
      {% if !api_href.is_empty() %}<p class="search-api"><a href="{{ api_href }}">JSON</a></p>{% endif %}
    </main>
  </body>
</html>"##,
    ext = "html"
)]
struct SearchPageTemplate<'a> {
    query: &'a str,
    panel_html: &'a str,
    api_href: String,
}

async fn search_html(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.as_deref().unwrap_or_default().trim();
    let rendered = run_search(&state, &params)
        .and_then(|panel| panel.render_html().map_err(ApiError::from))
        .and_then(|panel_html| {
            SearchPageTemplate {
                query,
                panel_html: &panel_html,
                api_href: api_search_href(query),
            }
            .render()
            .map_err(|err| ApiError::from(SearchError::from(err)))
        });
    match rendered {
        Ok(page) => Html(page).into_response(),
        Err(err) => (err.status, Html(render_error_page(&err.message))).into_response(),
    }
}

fn api_search_href(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    format!(
        "/api/search?q={}",
        utf8_percent_encode(query, NON_ALPHANUMERIC)
    )
}

fn render_error_page(message: &str) -> String {
    let message = crate::snippet::escape_html(message);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>BibleTexts • Search error</title>
  </head>
  <body>
    <main>
      <h1>Search could not run</h1>
      <p>{message}</p>
      <a href="/search">Back to search</a>
    </main>
  </body>
</html>"#
    )
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::SearchRecord;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router(site_dir: PathBuf) -> Router {
        let index = SearchIndex::precomputed(vec![
            SearchRecord::new("Genesis 1", "/gen.html")
                .with_content("In the beginning God created the heavens and the earth."),
            SearchRecord::new("Exodus 1", "/ex.html")
                .with_content("Now these are the names (shemot) of the sons of Israel."),
            SearchRecord::new("Ruth 1", "/ruth.html")
                .with_content("In the days when the judges ruled."),
        ]);
        let state = Arc::new(AppState {
            index: Arc::new(index),
            site: SiteConfig::default(),
        });
        build_router(state, site_dir)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn api_search_returns_hits() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/api/search?q=beginning").await;
        assert!(status.is_success());
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["kind"], "hits");
        assert_eq!(payload["hits"][0]["url"], "/gen.html");
        assert!(
            payload["hits"][0]["snippet_html"]
                .as_str()
                .unwrap()
                .contains(r#"<span class="search-highlight">beginning</span>"#)
        );
    }

    #[tokio::test]
    async fn api_search_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (_, body) = get(test_router(dir.path().into()), "/api/search?q=in%20the&limit=1").await;
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["hits"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn api_search_without_query_lists_quick_links() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/api/search").await;
        assert!(status.is_success());
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["kind"], "quick_links");
        assert_eq!(payload["links"][0]["url"], "/index.html");
    }

    #[tokio::test]
    async fn api_search_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/api/search?q=%28shemot").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("error"));
    }

    #[tokio::test]
    async fn search_page_renders_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/search?q=xyzzy").await;
        assert!(status.is_success());
        assert!(body.contains("No results found"));
        assert!(body.contains("q=xyzzy"));
        let no_results = body.find("search-no-results").unwrap();
        let quick = body.find("search-quick-links").unwrap();
        assert!(no_results < quick);
    }

    #[tokio::test]
    async fn health_reports_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/healthz").await;
        assert!(status.is_success());
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["pages"], 3);
    }

    #[tokio::test]
    async fn other_paths_serve_site_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gen.html"), "<h1>Genesis</h1>").unwrap();
        let (status, body) = get(test_router(dir.path().into()), "/gen.html").await;
        assert!(status.is_success());
        assert_eq!(body, "<h1>Genesis</h1>");

        let (missing, _) = get(test_router(dir.path().into()), "/absent.html").await;
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }
}
