use std::cmp;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use atty::Stream;
use bibletexts_rs::reading::{self, Slider};
use bibletexts_rs::session::ResultsPanel;
use bibletexts_rs::{
    FileStorage, PageContext, PageScan, ReadingSession, SearchConfig, SearchIndex, SearchRecord,
    SearchSession, SiteConfig, SiteIndexer, site,
};
use clap::{Parser, Subcommand};
use scraper::{ElementRef, Html};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "bibletexts-rs", about = "Search and reading tools for BibleTexts pages", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file overriding search, reading, and quick-link settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or inspect search indexes.
    #[command(subcommand)]
    Index(IndexCommand),
    /// Run a query against a precomputed index.
    Search {
        /// Text to look for in titles, content and keywords.
        query: String,
        /// Precomputed index produced by `index build`.
        #[arg(short, long, default_value = "search-index.json")]
        index: PathBuf,
        /// Maximum number of results; defaults to the configured cap.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Read or change persisted reading preferences.
    Prefs {
        /// Preference store shared across runs.
        #[arg(long, default_value = "bibletexts-prefs.json")]
        store: PathBuf,
        #[command(subcommand)]
        action: PrefsCommand,
    },
    /// Preview a site directory with a live search endpoint.
    #[cfg(feature = "web")]
    Serve {
        /// Directory of converted pages to serve.
        #[arg(long, default_value = ".")]
        site: PathBuf,
        /// Precomputed index; built from `--site` when absent.
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    /// Index every page under a site directory.
    Build {
        /// Directory containing .htm/.html pages.
        source_dir: PathBuf,
        /// Where to write the JSON index.
        #[arg(short, long, default_value = "search-index.json")]
        output: PathBuf,
        /// Also write a script assigning the index to the page global.
        #[arg(long)]
        js: Option<PathBuf>,
    },
    /// Show the fallback index a single page builds for itself.
    Page {
        /// HTML file of the page.
        file: PathBuf,
        /// URL path the page is served at.
        #[arg(long)]
        path: String,
        /// Site origin; absolute navigation links on this host count as same-site.
        #[arg(long)]
        origin: Option<Url>,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Print current preferences.
    Show,
    /// Set the font size in pixels.
    FontSize { px: f64 },
    /// Set the line height multiplier.
    LineHeight { value: f64 },
    /// Set the maximum content width in pixels.
    MaxWidth { px: f64 },
    /// Flip dark mode.
    DarkMode,
    /// Add the path to bookmarks, or remove it when already bookmarked.
    Bookmark { path: String },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = match &cli.config {
        Some(path) => SiteConfig::load(path)?,
        None => SiteConfig::default(),
    };
    match cli.command {
        Command::Index(IndexCommand::Build {
            source_dir,
            output,
            js,
        }) => handle_build(&source_dir, &output, js.as_deref(), &config.search, cli.json),
        Command::Index(IndexCommand::Page { file, path, origin }) => {
            handle_page(&file, path, origin, cli.json)
        }
        Command::Search {
            query,
            index,
            limit,
        } => handle_search(query, &index, limit, config, cli.json),
        Command::Prefs { store, action } => handle_prefs(&store, action, config, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { site, index, addr } => handle_serve(site, index, addr, config),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_build(
    source_dir: &Path,
    output: &Path,
    js: Option<&Path>,
    search: &SearchConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let index = SiteIndexer::new(source_dir).build()?;
    site::write_json(&index, output)?;
    if let Some(js) = js {
        site::write_js(&index, search, js)?;
    }

    if as_json {
        let payload = json!({
            "pages": index.len(),
            "output": output.display().to_string(),
            "script": js.map(|path| path.display().to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Indexed {} pages", index.len());
        println!("Index saved to {}", output.display());
        if let Some(js) = js {
            println!("Search script written to {}", js.display());
        }
    }
    Ok(())
}

fn handle_page(
    file: &Path,
    path: String,
    origin: Option<Url>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = fs::read_to_string(file).map_err(|err| format!("{}: {err}", file.display()))?;
    let mut context = PageContext::new(path);
    if let Some(origin) = origin {
        context = context.with_origin(origin);
    }
    let index = PageScan::scan(&html, &context);

    if as_json {
        println!("{}", serde_json::to_string_pretty(index.records())?);
    } else {
        print_record_table(index.records());
    }
    Ok(())
}

fn handle_search(
    query: String,
    index_path: &Path,
    limit: Option<usize>,
    mut config: SiteConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if let Some(limit) = limit {
        config.search.max_results = cmp::max(1, limit);
    }
    let index = SearchIndex::load(index_path)?;
    let session = SearchSession::new(index, config.search, None).with_quick_links(config.quick_links);
    let panel = session.search(&query)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&panel)?);
    } else {
        print_panel(&panel);
    }
    Ok(())
}

fn handle_prefs(
    store: &Path,
    action: PrefsCommand,
    config: SiteConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut prefs = ReadingSession::new(FileStorage::open(store)?, config.reading);
    match action {
        PrefsCommand::Show => {}
        PrefsCommand::FontSize { px } => {
            prefs.set_slider(Slider::FontSize, px);
        }
        PrefsCommand::LineHeight { value } => {
            prefs.set_slider(Slider::LineHeight, value);
        }
        PrefsCommand::MaxWidth { px } => {
            prefs.set_slider(Slider::MaxWidth, px);
        }
        PrefsCommand::DarkMode => {
            prefs.toggle_dark_mode();
        }
        PrefsCommand::Bookmark { path } => {
            prefs.toggle_bookmark(&path);
        }
    }

    if as_json {
        let payload = json!({
            "font_size": prefs.slider(Slider::FontSize),
            "line_height": prefs.slider(Slider::LineHeight),
            "max_width": prefs.slider(Slider::MaxWidth),
            "dark_mode": prefs.dark_mode(),
            "bookmarks": prefs.bookmarks(),
            "chrome": prefs.chrome(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Font size:   {}px", prefs.slider(Slider::FontSize));
        println!("Line height: {}", prefs.slider(Slider::LineHeight));
        println!("Max width:   {}px", prefs.slider(Slider::MaxWidth));
        println!(
            "Dark mode:   {}",
            if prefs.chrome().has_class(reading::DARK_MODE_CLASS) { "on" } else { "off" }
        );
        let bookmarks = prefs.bookmarks();
        if bookmarks.is_empty() {
            println!("Bookmarks:   none");
        } else {
            println!("Bookmarks:");
            for path in bookmarks {
                println!("  - {path}");
            }
        }
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    site_dir: PathBuf,
    index: Option<PathBuf>,
    addr: std::net::SocketAddr,
    config: SiteConfig,
) -> Result<(), Box<dyn Error>> {
    use bibletexts_rs::web::{self, WebConfig};

    let index = match index {
        Some(path) => SearchIndex::load(&path)?,
        None => SiteIndexer::new(&site_dir).build()?,
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::serve(
        WebConfig {
            addr,
            site_dir,
            site: config,
        },
        index,
    ))?;
    Ok(())
}

fn print_record_table(records: &[SearchRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    let width = records
        .iter()
        .map(|record| record.title.chars().count())
        .max()
        .unwrap_or(5)
        .max("TITLE".len());
    println!("{:<width$}  {:<8}  {}", "TITLE", "CHARS", "URL", width = width);
    println!("{:-<width$}  {:-<8}  {}", "", "", "---", width = width);
    for record in records {
        println!(
            "{:<width$}  {:<8}  {}",
            record.title,
            record.content.chars().count(),
            record.url,
            width = width
        );
    }
}

fn print_panel(panel: &ResultsPanel) {
    match panel {
        ResultsPanel::QuickLinks { links } => {
            println!("Type at least two characters to search. Quick links:");
            for link in links {
                println!("  {}  {}", link.label, link.url);
            }
        }
        ResultsPanel::Loading { query } => println!("Searching for \"{query}\"…"),
        ResultsPanel::NoResults { query, quick_links } => {
            println!("No results found for \"{query}\".");
            println!("Quick links:");
            for link in quick_links {
                println!("  {}  {}", link.label, link.url);
            }
        }
        ResultsPanel::Hits { query, hits } => {
            println!("{} result(s) for \"{query}\":", hits.len());
            for hit in hits {
                println!("\n{}  ({})", hit.title, hit.url);
                let snippet = snippet_markdown(&hit.snippet_html);
                if !snippet.is_empty() {
                    render_markdown_line(&snippet);
                }
            }
        }
    }
}

/// Turns highlight spans into markdown bold; everything else becomes plain text.
fn snippet_markdown(snippet_html: &str) -> String {
    let fragment = Html::parse_fragment(snippet_html);
    let mut out = String::new();
    for node in fragment.root_element().children() {
        if let Some(text) = node.value().as_text() {
            out.push_str(text);
        } else if let Some(element) = ElementRef::wrap(node) {
            out.push_str("**");
            out.push_str(&element.text().collect::<String>());
            out.push_str("**");
        }
    }
    out
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_line(body: &str) {
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, body, Some(markdown_width()));
        print!("{formatted}");
    } else {
        println!("{body}");
    }
}
