//! Host actions. Terminal input is mapped to actions, actions drive the shell.

use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ── Lifecycle ──────────────────────────────────────────────────
    Quit,

    // ── Navigation ────────────────────────────────────────────────
    /// Jump to the nth accessible feature (0-based).
    JumpTo(usize),
    NextFeature,
    PrevFeature,

    // ── Document input ────────────────────────────────────────────
    /// Dispatch an Escape key press to the document.
    Escape,
    /// Click the button carrying this hotkey.
    Hotkey(char),
    /// Click a specific element.
    Click(String),
}

/// Map a key press. While a modal is showing it captures everything except
/// Ctrl+C, the way a dialog would on a page.
pub fn map_key(key: KeyEvent, modal_active: bool) -> Option<Action> {
    if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    if modal_active {
        return match key.code {
            KeyCode::Esc => Some(Action::Escape),
            KeyCode::Char(c) if key.modifiers.difference(KeyModifiers::SHIFT).is_empty() => {
                Some(Action::Hotkey(c))
            }
            _ => None,
        };
    }

    match (key.modifiers, key.code) {
        (KeyModifiers::NONE, KeyCode::Char('q')) => Some(Action::Quit),

        (KeyModifiers::NONE, KeyCode::Char(c @ '1'..='9')) => {
            c.to_digit(10)
                .and_then(|n| usize::try_from(n).ok())
                .map(|n| Action::JumpTo(n - 1))
        }

        (KeyModifiers::NONE, KeyCode::Tab) => Some(Action::NextFeature),
        (KeyModifiers::SHIFT, KeyCode::BackTab) => Some(Action::PrevFeature),

        (KeyModifiers::NONE, KeyCode::Esc) => Some(Action::Escape),

        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => Some(Action::Hotkey(c)),

        _ => None,
    }
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A status-bar notice raised from bus traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Success,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Error,
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Info,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
