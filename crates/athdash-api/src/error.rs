use athdash_core::BoundaryError;
use thiserror::Error;

/// Top-level error type for the `athdash-api` crate.
///
/// Features never see this directly: the data boundary converts it into a
/// [`BoundaryError`] carrying only a message.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The nonce could not be sent as a header value.
    #[error("Invalid nonce header value")]
    InvalidNonce,

    // ── Server ──────────────────────────────────────────────────────
    /// 401/403: missing or expired nonce, or no permission for the feature.
    #[error("Not authorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 2xx response whose envelope says `success: false`.
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if a fresh nonce or login might resolve this.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<Error> for BoundaryError {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected { message } => Self::Rejected { message },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}
