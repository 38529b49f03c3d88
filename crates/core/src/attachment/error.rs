//! Attachment error types.

use thiserror::Error;
use uuid::Uuid;

use super::types::AttachmentStatus;
use crate::storage::BlobError;

/// Attachment operation errors.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// File exceeds the configured maximum size.
    #[error("payload too large: {size} bytes exceeds maximum {max} bytes")]
    PayloadTooLarge {
        /// Actual file size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Attachment not found.
    #[error("attachment not found: {0}")]
    NotFound(Uuid),

    /// No backup payload exists for the attachment.
    #[error("no preview available for attachment {0}")]
    PreviewUnavailable(Uuid),

    /// State machine guard rejected a transition.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: AttachmentStatus,
        /// Requested status.
        to: AttachmentStatus,
    },

    /// Retry ceiling reached; no further automatic attempts.
    #[error("retry attempts exhausted for attachment {id} after {attempts} attempts")]
    RetryExhausted {
        /// Attachment ID.
        id: Uuid,
        /// Attempts made.
        attempts: u32,
    },

    /// Remote store operation failed.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl AttachmentError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(id)
    }

    /// Create a preview unavailable error.
    #[must_use]
    pub fn preview_unavailable(id: Uuid) -> Self {
        Self::PreviewUnavailable(id)
    }

    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: AttachmentStatus, to: AttachmentStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create a payload too large error.
    #[must_use]
    pub fn payload_too_large(size: u64, max: u64) -> Self {
        Self::PayloadTooLarge { size, max }
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}
