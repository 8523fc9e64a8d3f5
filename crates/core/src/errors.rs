//! Shared error types for the pontual crates.

use thiserror::Error;

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Faults raised by the local durable store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("{0}")]
    Internal(String),
}

/// Top-level error currency shared by every crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Local storage fault; fatal to the calling operation.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote store rejected or failed an operation.
    #[error("Remote store error: {0}")]
    Remote(String),

    /// No connectivity at call time.
    #[error("No network connection: {0}")]
    NetworkUnavailable(String),

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    /// Create a remote error from any displayable source.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
