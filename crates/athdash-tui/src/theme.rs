//! Palette and semantic styles for the terminal host.

use ratatui::style::{Color, Modifier, Style};

// ── Core Palette ──────────────────────────────────────────────────────

pub const TRACK_ORANGE: Color = Color::Rgb(255, 140, 66); // #ff8c42
pub const POOL_CYAN: Color = Color::Rgb(94, 234, 212); // #5eead4
pub const PODIUM_GOLD: Color = Color::Rgb(250, 204, 21); // #facc15
pub const SUCCESS_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const ERROR_RED: Color = Color::Rgb(255, 99, 99); // #ff6363

// ── Extended Palette ──────────────────────────────────────────────────

pub const DIM_WHITE: Color = Color::Rgb(203, 213, 225); // #cbd5e1
pub const BORDER_SLATE: Color = Color::Rgb(100, 116, 139); // #64748b
pub const BG_HIGHLIGHT: Color = Color::Rgb(30, 41, 59); // #1e293b
pub const BG_DARK: Color = Color::Rgb(15, 23, 42); // #0f172a

// ── Semantic Styles ───────────────────────────────────────────────────

pub fn title_style() -> Style {
    Style::default().fg(POOL_CYAN).add_modifier(Modifier::BOLD)
}

pub fn brand_style() -> Style {
    Style::default()
        .fg(TRACK_ORANGE)
        .add_modifier(Modifier::BOLD)
}

pub fn border_focused() -> Style {
    Style::default().fg(TRACK_ORANGE)
}

pub fn border_default() -> Style {
    Style::default().fg(BORDER_SLATE)
}

/// Heading elements inside a feature.
pub fn heading() -> Style {
    Style::default()
        .fg(POOL_CYAN)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
}

pub fn body_text() -> Style {
    Style::default().fg(DIM_WHITE)
}

/// Sidebar entry of the mounted feature.
pub fn nav_active() -> Style {
    Style::default()
        .fg(TRACK_ORANGE)
        .bg(BG_HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

pub fn nav_inactive() -> Style {
    Style::default().fg(DIM_WHITE)
}

pub fn button() -> Style {
    Style::default().fg(PODIUM_GOLD)
}

pub fn key_hint() -> Style {
    Style::default().fg(BORDER_SLATE)
}

pub fn key_hint_key() -> Style {
    Style::default().fg(POOL_CYAN).add_modifier(Modifier::BOLD)
}
