//! Document → terminal. Walks the shell's headless document and turns
//! elements into ratatui lines; also owns the screen geometry so mouse
//! hit-testing and rendering agree.

use athdash_core::dom::{ACTIVE_CLASS, HOTKEY_ATTR};
use athdash_core::modal::content_id;
use athdash_core::shell::{FEATURE_ATTR, NAV_ID};
use athdash_core::{Document, Element, MemoryDocument, ModalManager, ModalSize, Tag};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::{Line, Span};

use crate::theme;

// ── Geometry ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Areas {
    pub header: Rect,
    pub sidebar: Rect,
    pub content: Rect,
    pub status: Rect,
}

const SIDEBAR_WIDTH: u16 = 28;

pub fn areas(area: Rect) -> Areas {
    let rows = Layout::vertical([
        Constraint::Length(3), // Header
        Constraint::Min(1),    // Sidebar + content
        Constraint::Length(1), // Status bar
    ])
    .split(area);
    let body = Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(rows[1]);

    Areas {
        header: rows[0],
        sidebar: body[0],
        content: body[1],
        status: rows[2],
    }
}

/// Centered popup rectangle for a modal of `size`, clamped to `area`.
pub fn popup_area(area: Rect, size: ModalSize) -> Rect {
    let (width, height) = match size {
        ModalSize::Small => (48u16, 12u16),
        ModalSize::Medium => (64, 16),
        ModalSize::Large => (84, 22),
    };
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.width.saturating_sub(width) / 2;
    let y = area.height.saturating_sub(height) / 2;
    Rect::new(area.x + x, area.y + y, width, height)
}

/// Whether `(column, row)` falls inside `rect`.
pub fn contains(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x
        && column < rect.x.saturating_add(rect.width)
        && row >= rect.y
        && row < rect.y.saturating_add(rect.height)
}

// ── Elements ────────────────────────────────────────────────────────

/// One line per visible element. Containers without text and empty
/// paragraphs produce nothing.
pub fn element_line(depth: usize, element: &Element) -> Option<Line<'static>> {
    let indent = Span::raw("  ".repeat(depth.saturating_sub(1)));
    let text = element.text.clone().filter(|t| !t.is_empty());

    let line = match element.tag {
        Tag::Heading => Line::from(vec![indent, Span::styled(text?, theme::heading())]),
        Tag::Button => {
            let label = text?;
            let key = element
                .attribute(HOTKEY_ATTR)
                .map_or_else(|| "[·]".to_owned(), |key| format!("[{key}]"));
            Line::from(vec![
                indent,
                Span::styled(key, theme::key_hint_key()),
                Span::raw(" "),
                Span::styled(label, theme::button()),
            ])
        }
        Tag::Item => Line::from(vec![
            indent,
            Span::styled(format!("• {}", text?), theme::body_text()),
        ]),
        _ => Line::from(vec![indent, Span::styled(text?, theme::body_text())]),
    };
    Some(line)
}

/// Lines for everything below `root` (the root itself is not drawn).
pub fn outline_lines(document: &MemoryDocument, root: &str) -> Vec<Line<'static>> {
    document
        .outline(root)
        .into_iter()
        .skip(1)
        .filter_map(|(depth, element)| element_line(depth, &element))
        .collect()
}

/// The element under `within` whose hotkey is `key`.
pub fn hotkey_target(document: &dyn Document, within: &str, key: char) -> Option<String> {
    let key = key.to_string();
    document
        .query_attribute(HOTKEY_ATTR, Some(within))
        .into_iter()
        .find(|(_, value)| *value == key)
        .map(|(id, _)| id)
}

// ── Navigation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub element: String,
    pub feature: String,
    pub label: String,
    pub active: bool,
}

/// Sidebar entries in document order.
pub fn nav_entries(document: &dyn Document) -> Vec<NavEntry> {
    document
        .children(NAV_ID)
        .into_iter()
        .filter_map(|id| document.element(&id))
        .filter_map(|element| {
            let feature = element.attribute(FEATURE_ATTR)?.to_owned();
            Some(NavEntry {
                active: element.has_class(ACTIVE_CLASS),
                label: element.text.clone().unwrap_or_else(|| feature.clone()),
                feature,
                element: element.id,
            })
        })
        .collect()
}

// ── Modal ───────────────────────────────────────────────────────────

pub struct ModalView {
    pub title: String,
    pub size: ModalSize,
    pub body: Vec<Line<'static>>,
    pub buttons: Line<'static>,
}

/// What to draw for the active modal, if any.
pub fn modal_view(document: &MemoryDocument, modals: &ModalManager) -> Option<ModalView> {
    let id = modals.active()?;
    let spec = modals.spec(&id)?;

    let mut spans = Vec::new();
    for button in document.children(&format!("{id}-footer")) {
        let Some(element) = document.element(&button) else {
            continue;
        };
        if let Some(line) = element_line(1, &element) {
            if !spans.is_empty() {
                spans.push(Span::raw("   "));
            }
            spans.extend(line.spans);
        }
    }

    Some(ModalView {
        body: outline_lines(document, &content_id(&id)),
        buttons: Line::from(spans),
        title: spec.title,
        size: spec.size,
    })
}
