//! Reading-comfort widgets: sliders, progress, table of contents, bookmarks, dark mode.
//!
//! Each widget writes straight through to [`Storage`] and mirrors its state onto
//! [`PageChrome`], the body classes and CSS custom properties of the page.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::debug;

use crate::config::ReadingDefaults;
use crate::extract;
use crate::record::Heading;
use crate::storage::Storage;

pub const STORAGE_PREFIX: &str = "bibletexts-";
pub const FONT_SIZE_KEY: &str = "bibletexts-font-size";
pub const LINE_HEIGHT_KEY: &str = "bibletexts-line-height";
pub const MAX_WIDTH_KEY: &str = "bibletexts-max-width";
pub const BOOKMARKS_KEY: &str = "bibletexts-bookmarks";
pub const DARK_MODE_KEY: &str = "bibletexts-dark-mode";

pub const DARK_MODE_CLASS: &str = "dark-mode";
pub const FONT_SIZE_VAR: &str = "--reading-font-size";
pub const LINE_HEIGHT_VAR: &str = "--reading-line-height";
pub const MAX_WIDTH_VAR: &str = "--reading-max-width";

pub const FONT_SIZE_RANGE: RangeInclusive<f64> = 12.0..=28.0;
pub const LINE_HEIGHT_RANGE: RangeInclusive<f64> = 1.2..=2.4;
pub const MAX_WIDTH_RANGE: RangeInclusive<f64> = 600.0..=1400.0;

/// Body-level markers and CSS custom properties a widget can touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageChrome {
    pub body_classes: BTreeSet<String>,
    pub style_vars: BTreeMap<String, String>,
}

impl PageChrome {
    pub fn has_class(&self, class: &str) -> bool {
        self.body_classes.contains(class)
    }

    pub fn set_class(&mut self, class: &str, enabled: bool) {
        if enabled {
            self.body_classes.insert(class.to_string());
        } else {
            self.body_classes.remove(class);
        }
    }

    pub fn style_var(&self, name: &str) -> Option<&str> {
        self.style_vars.get(name).map(String::as_str)
    }

    /// `style` attribute value for the document root.
    pub fn inline_style(&self) -> String {
        self.style_vars
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slider {
    FontSize,
    LineHeight,
    MaxWidth,
}

impl Slider {
    pub const ALL: [Slider; 3] = [Slider::FontSize, Slider::LineHeight, Slider::MaxWidth];

    pub fn storage_key(self) -> &'static str {
        match self {
            Slider::FontSize => FONT_SIZE_KEY,
            Slider::LineHeight => LINE_HEIGHT_KEY,
            Slider::MaxWidth => MAX_WIDTH_KEY,
        }
    }

    pub fn css_var(self) -> &'static str {
        match self {
            Slider::FontSize => FONT_SIZE_VAR,
            Slider::LineHeight => LINE_HEIGHT_VAR,
            Slider::MaxWidth => MAX_WIDTH_VAR,
        }
    }

    pub fn range(self) -> RangeInclusive<f64> {
        match self {
            Slider::FontSize => FONT_SIZE_RANGE,
            Slider::LineHeight => LINE_HEIGHT_RANGE,
            Slider::MaxWidth => MAX_WIDTH_RANGE,
        }
    }

    fn default_value(self, defaults: &ReadingDefaults) -> f64 {
        match self {
            Slider::FontSize => defaults.font_size,
            Slider::LineHeight => defaults.line_height,
            Slider::MaxWidth => defaults.max_width,
        }
    }

    fn css_value(self, value: f64) -> String {
        match self {
            Slider::LineHeight => format!("{value}"),
            Slider::FontSize | Slider::MaxWidth => format!("{value}px"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadingCommand {
    SetSlider(Slider, f64),
    ToggleDarkMode,
    /// Adds or removes the bookmark for the given path.
    ToggleBookmark(String),
}

/// Scroll progress in percent, clamped to `0..=100`; pages that cannot scroll report 0.
pub fn reading_progress(scroll_top: f64, scroll_height: f64, client_height: f64) -> f64 {
    let scrollable = scroll_height - client_height;
    if !scrollable.is_finite() || scrollable <= 0.0 {
        return 0.0;
    }
    (scroll_top / scrollable * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
    pub anchor: String,
}

/// One entry per heading; headings without an id get `heading-{position}`, unless
/// another heading already owns that id.
pub fn table_of_contents(headings: &[Heading]) -> Vec<TocEntry> {
    let mut taken: HashSet<String> = headings
        .iter()
        .filter(|heading| !heading.id.is_empty())
        .map(|heading| heading.id.clone())
        .collect();
    headings
        .iter()
        .enumerate()
        .map(|(position, heading)| TocEntry {
            level: heading.level,
            text: heading.text.clone(),
            anchor: if heading.id.is_empty() {
                extract::unique_heading_id(position, &mut taken)
            } else {
                heading.id.clone()
            },
        })
        .collect()
}

pub struct ReadingSession<S: Storage> {
    storage: S,
    defaults: ReadingDefaults,
    chrome: PageChrome,
}

impl<S: Storage> ReadingSession<S> {
    /// Restores every widget from storage, falling back to `defaults`.
    pub fn new(storage: S, defaults: ReadingDefaults) -> Self {
        let mut session = Self {
            storage,
            defaults,
            chrome: PageChrome::default(),
        };
        for slider in Slider::ALL {
            let value = session.slider(slider);
            session.apply_slider(slider, value);
        }
        let dark = session.dark_mode();
        session.chrome.set_class(DARK_MODE_CLASS, dark);
        session
    }

    pub fn chrome(&self) -> &PageChrome {
        &self.chrome
    }

    pub fn chrome_mut(&mut self) -> &mut PageChrome {
        &mut self.chrome
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn dispatch(&mut self, command: ReadingCommand) {
        match command {
            ReadingCommand::SetSlider(slider, value) => {
                self.set_slider(slider, value);
            }
            ReadingCommand::ToggleDarkMode => {
                self.toggle_dark_mode();
            }
            ReadingCommand::ToggleBookmark(path) => {
                self.toggle_bookmark(&path);
            }
        }
    }

    pub fn slider(&self, slider: Slider) -> f64 {
        self.storage
            .get(slider.storage_key())
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| slider.range().contains(value))
            .unwrap_or_else(|| slider.default_value(&self.defaults))
    }

    /// Clamps into the slider's range, then writes the CSS property and storage key.
    pub fn set_slider(&mut self, slider: Slider, value: f64) -> f64 {
        let range = slider.range();
        let value = if value.is_finite() {
            value.clamp(*range.start(), *range.end())
        } else {
            slider.default_value(&self.defaults)
        };
        self.storage.set(slider.storage_key(), &value.to_string());
        self.apply_slider(slider, value);
        value
    }

    fn apply_slider(&mut self, slider: Slider, value: f64) {
        self.chrome
            .style_vars
            .insert(slider.css_var().to_string(), slider.css_value(value));
    }

    pub fn dark_mode(&self) -> bool {
        self.storage
            .get(DARK_MODE_KEY)
            .is_some_and(|raw| raw.trim() == "true")
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        let enabled = !self.dark_mode();
        self.storage.set(DARK_MODE_KEY, if enabled { "true" } else { "false" });
        self.chrome.set_class(DARK_MODE_CLASS, enabled);
        debug!(enabled, "dark mode toggled");
        enabled
    }

    pub fn bookmarks(&self) -> Vec<String> {
        let Some(raw) = self.storage.get(BOOKMARKS_KEY) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            debug!(error = %err, "ignoring unreadable bookmark list");
            Vec::new()
        })
    }

    pub fn is_bookmarked(&self, path: &str) -> bool {
        self.bookmarks().iter().any(|saved| saved == path)
    }

    /// Returns whether `path` is bookmarked afterwards.
    pub fn toggle_bookmark(&mut self, path: &str) -> bool {
        let mut bookmarks = self.bookmarks();
        let bookmarked = if bookmarks.iter().any(|saved| saved == path) {
            bookmarks.retain(|saved| saved != path);
            false
        } else {
            bookmarks.push(path.to_string());
            true
        };
        match serde_json::to_string(&bookmarks) {
            Ok(serialized) => self.storage.set(BOOKMARKS_KEY, &serialized),
            Err(err) => debug!(error = %err, "failed to serialize bookmarks"),
        }
        bookmarked
    }
}
