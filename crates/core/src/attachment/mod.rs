//! Attachment management for file uploads across two stores.
//!
//! This module provides the upload orchestrator and domain model:
//! - Upload with remote put + local backup fallback
//! - Lifecycle state machine (`pending_upload` / `active` / `failed` / `deleted`)
//! - Metadata and preview reads
//! - Soft delete with asynchronous remote cleanup
//! - Caller-initiated retry

mod error;
mod service;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::AttachmentError;
pub use service::{AttachmentManager, AttachmentStore};
pub use types::{
    Attachment, AttachmentConfig, AttachmentStatus, BackupData, BackupKind,
    CreateAttachmentInput, UploadInput, UploadOutcome,
};
