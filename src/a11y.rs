//! Navigation and accessibility affordances: mobile nav toggle, grid keyboard
//! navigation, lazy image loading, table wrapping and the skip link.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::extract;
use crate::reading::PageChrome;
use crate::snippet::escape_html;

pub const NAV_OPEN_CLASS: &str = "nav-open";
pub const TABLE_WRAPPER_CLASS: &str = "table-wrapper";

static TABLES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("static selector is valid CSS"));
static CAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("caption").expect("static selector is valid CSS"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavToggle {
    expanded: bool,
}

impl NavToggle {
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Value for the toggle button's `aria-expanded` attribute.
    pub fn aria_expanded(&self) -> &'static str {
        if self.expanded { "true" } else { "false" }
    }

    pub fn toggle(&mut self, chrome: &mut PageChrome) -> bool {
        self.set(chrome, !self.expanded);
        self.expanded
    }

    pub fn close(&mut self, chrome: &mut PageChrome) {
        self.set(chrome, false);
    }

    /// Escape collapses an open menu; reports whether the key was consumed.
    pub fn handle_key(&mut self, key: &str, chrome: &mut PageChrome) -> bool {
        if key == "Escape" && self.expanded {
            self.close(chrome);
            return true;
        }
        false
    }

    fn set(&mut self, chrome: &mut PageChrome, expanded: bool) {
        self.expanded = expanded;
        chrome.set_class(NAV_OPEN_CLASS, expanded);
    }
}

/// Roving focus over a grid of `len` items laid out `columns` per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridNavigator {
    len: usize,
    columns: usize,
    focused: usize,
}

impl GridNavigator {
    pub fn new(len: usize, columns: usize) -> Self {
        Self {
            len,
            columns: columns.max(1),
            focused: 0,
        }
    }

    pub fn focused(&self) -> Option<usize> {
        (self.len > 0).then_some(self.focused)
    }

    pub fn focus(&mut self, index: usize) {
        if index < self.len {
            self.focused = index;
        }
    }

    /// Moves focus for an arrow, Home or End key. Returns the new focus when the
    /// key is a navigation key; movement stops at the grid edges.
    pub fn handle_key(&mut self, key: &str) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let last = self.len - 1;
        let current = self.focused;
        self.focused = match key {
            "ArrowRight" => (current + 1).min(last),
            "ArrowLeft" => current.saturating_sub(1),
            "ArrowDown" if current + self.columns <= last => current + self.columns,
            "ArrowDown" => current,
            "ArrowUp" => current.checked_sub(self.columns).unwrap_or(current),
            "Home" => 0,
            "End" => last,
            _ => return None,
        };
        Some(self.focused)
    }
}

/// Tracks images waiting to enter the viewport. Each loads once, then detaches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LazyImages {
    pending: BTreeSet<String>,
}

impl LazyImages {
    pub fn observe(&mut self, image_id: impl Into<String>) {
        self.pending.insert(image_id.into());
    }

    pub fn unobserve(&mut self, image_id: &str) {
        self.pending.remove(image_id);
    }

    pub fn is_observed(&self, image_id: &str) -> bool {
        self.pending.contains(image_id)
    }

    /// True when the image should load now; later sightings of it report false.
    pub fn on_visible(&mut self, image_id: &str) -> bool {
        self.pending.remove(image_id)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Fragment the skip link jumps to, or `None` when the page has no main region.
pub fn skip_link(main_id: Option<&str>) -> Option<String> {
    main_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| format!("#{id}"))
}

/// Serializes `page_html` with every table inside a focusable, scrollable region.
/// Tables whose parent is already a `div.table-wrapper` are left as they are.
pub fn wrap_tables(page_html: &str) -> String {
    let document = Html::parse_document(page_html);
    let serialized = document.html();

    // (position, closes, markup); closes sort before opens at the same offset.
    let mut inserts: Vec<(usize, bool, String)> = Vec::new();
    let mut cursor = 0;
    for table in document.select(&TABLES) {
        let outer = table.html();
        let Some(found) = serialized[cursor..].find(&outer) else {
            continue;
        };
        let start = cursor + found;
        cursor = start + 1;
        if is_wrapped(table) {
            continue;
        }
        let label = table
            .select(&CAPTION)
            .next()
            .map(extract::element_text)
            .filter(|caption| !caption.is_empty())
            .unwrap_or_else(|| "Table".to_string());
        inserts.push((
            start,
            false,
            format!(
                r#"<div class="{TABLE_WRAPPER_CLASS}" role="region" tabindex="0" aria-label="{}">"#,
                escape_html(&label)
            ),
        ));
        inserts.push((start + outer.len(), true, "</div>".to_string()));
    }
    inserts.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut out = String::with_capacity(serialized.len() + inserts.len() * 40);
    let mut last = 0;
    for (position, _, markup) in inserts {
        out.push_str(&serialized[last..position]);
        out.push_str(&markup);
        last = position;
    }
    out.push_str(&serialized[last..]);
    out
}

fn is_wrapped(table: ElementRef<'_>) -> bool {
    table
        .parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|parent| {
            parent.value().name() == "div"
                && parent.value().classes().any(|class| class == TABLE_WRAPPER_CLASS)
        })
}
