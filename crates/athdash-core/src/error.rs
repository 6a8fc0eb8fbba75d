// ── Core error types ──
//
// Only failures a caller can act on are returned. Configuration mistakes
// (unknown modal id, duplicate registration, stale trigger markup) are
// logged and degraded where they happen and never surface here.

use thiserror::Error;

/// Error returned by a subscribed handler. Caught and logged by the bus.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for bus handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Unified error type for the composition layer.
#[derive(Debug, Error)]
pub enum DashboardError {
    // ── Bus ──────────────────────────────────────────────────────────
    #[error("topic must not be empty")]
    EmptyTopic,

    // ── Features ─────────────────────────────────────────────────────
    #[error("feature not registered: {id}")]
    UnknownFeature { id: String },

    #[error("no accessible feature to mount")]
    NoAccessibleFeature,

    #[error("feature '{id}' failed to mount: {reason}")]
    MountFailed { id: String, reason: String },

    #[error("navigation to '{to}' ignored: a mount is already in progress")]
    NavigationInProgress { to: String },

    // ── Document ─────────────────────────────────────────────────────
    #[error("document element not found: {id}")]
    MissingElement { id: String },
}

/// Error a feature returns from its mount hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FeatureError {
    pub message: String,
}

impl FeatureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by the data boundary. Transport details stay in the
/// client crate; features only see a message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("no data boundary configured")]
    Unavailable,

    #[error("request failed: {message}")]
    Transport { message: String },

    #[error("server rejected the request: {message}")]
    Rejected { message: String },
}
