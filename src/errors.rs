//! Typed error hierarchy for the Trellis client.
//!
//! Two top-level enums cover the two subsystems:
//! - `ClientError`: REST calls, credentials and session operations
//! - `RealtimeError`: realtime channel transport failures
//!
//! The CLI wraps both in `anyhow` with context; the library never does.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the HTTP client and the session manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (DNS, refused, reset, TLS).
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered 401. The session has already been expired by
    /// the response guard when the caller sees this.
    #[error("Not authorized: {detail}")]
    Unauthorized { detail: String },

    /// Any other non-success status; `detail` is the backend message verbatim.
    #[error("{detail}")]
    Api { status: StatusCode, detail: String },

    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Credential store error: {0}")]
    Credential(#[source] std::io::Error),

    #[error("Not logged in")]
    NotAuthenticated,
}

impl ClientError {
    /// HTTP status for errors that carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Message suitable for a user-facing status line.
    ///
    /// Backend validation and auth details pass through unchanged; transport
    /// failures collapse into a generic "failed to load" message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { detail, .. } | Self::Unauthorized { detail } => detail.clone(),
            Self::Transport(_) => "Failed to reach the server".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors from the realtime channel.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Realtime connection failed: {0}")]
    Connect(String),

    #[error("Realtime protocol error: {0}")]
    Protocol(String),

    #[error("Realtime connection closed")]
    Closed,
}
