//! Blob store error types.

use thiserror::Error;

/// Blob store operation errors.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Remote store unreachable, throttled, or timed out. Transient: the
    /// caller falls back to the local backup path and retries later.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// Object not found in the remote store.
    #[error("object not found: {key}")]
    NotFound {
        /// Object key that was not found.
        key: String,
    },

    /// Provider configuration error.
    #[error("blob store configuration error: {0}")]
    Configuration(String),

    /// Non-transient operation failure.
    #[error("blob store operation failed: {0}")]
    Operation(String),
}

impl BlobError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Whether a retry at a later time may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<opendal::Error> for BlobError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ if err.is_temporary() => Self::Unavailable(err.to_string()),
            _ => Self::Operation(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for BlobError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Unavailable("operation timed out".to_string())
    }
}
