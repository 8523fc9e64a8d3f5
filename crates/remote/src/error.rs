//! Error types for the remote store crate.

use thiserror::Error;

/// Result type alias for remote store operations.
pub type Result<T> = std::result::Result<T, RemoteStoreError>;

/// Errors that can occur while talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structured error response from the remote store
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid credentials)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteStoreError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status, when one was observed.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// True for transport-level timeouts where the request outcome is unknown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_timeout())
    }

    /// True when a create failed because the row already exists remotely.
    pub fn is_duplicate(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                *status == 409
                    || message.contains("23505")
                    || message.to_lowercase().contains("duplicate")
            }
            _ => false,
        }
    }
}

impl From<RemoteStoreError> for pontual_core::errors::Error {
    fn from(err: RemoteStoreError) -> Self {
        pontual_core::errors::Error::Remote(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_create_detected_from_postgres_code() {
        let err = RemoteStoreError::api(400, "duplicate key value violates 23505");
        assert!(err.is_duplicate());
        let err = RemoteStoreError::api(409, "Conflict");
        assert!(err.is_duplicate());
        let err = RemoteStoreError::api(500, "boom");
        assert!(!err.is_duplicate());
    }

    #[test]
    fn status_code_surfaces_for_api_errors() {
        let err = RemoteStoreError::api(503, "unavailable");
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(RemoteStoreError::auth("nope").status_code(), None);
    }
}
