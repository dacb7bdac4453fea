//! Error types shared by the contacts sync crates.

use thiserror::Error;

use crate::contacts::{MappingError, TranslateError};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for contacts sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Local store failure
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// A record or entry could not be translated
    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    /// A field mapping table is misconfigured or a value is unmapped
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Structural sync failure (wrong entry type for a feed, etc.)
    #[error("Sync error: {0}")]
    Sync(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a structural sync error
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    /// True when this error only affects a single record and the caller may
    /// skip it and continue the batch.
    pub fn is_retryable_translate(&self) -> bool {
        matches!(self, Self::Translate(err) if err.is_retryable())
    }
}

/// Errors raised by local store implementations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}
