//! Error types for the feed transport.

use contactsync_core::sync::{classify_http_status, SyncFailureKind};
use thiserror::Error;

/// Result type alias for feed transport operations.
pub type Result<T> = std::result::Result<T, FeedSyncError>;

/// Errors that can occur while talking to the feed server.
#[derive(Debug, Error)]
pub enum FeedSyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the feed server
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl FeedSyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// How this failure affects the running sync pass.
    pub fn failure_kind(&self) -> SyncFailureKind {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncFailureKind::Transient,
            Self::Json(_) => SyncFailureKind::Malformed,
            Self::Auth(_) => SyncFailureKind::Unauthorized,
        }
    }
}
