//! Attachment types and data structures.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Attachment lifecycle status.
///
/// The valid transitions are:
/// - `PendingUpload` → `Active` (remote put succeeds)
/// - `PendingUpload` → `Failed` (retry ceiling exceeded)
/// - `Active` → `PendingUpload` (verify finds object missing, backup exists)
/// - `Active` → `Failed` (verify finds object missing, no backup)
/// - any non-deleted → `Deleted` (delete requested; terminal)
///
/// `Failed` has no automatic exit: only a fresh upload or caller-initiated
/// retry recovers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    /// Remote store does not (yet) hold the file; a backup does.
    PendingUpload,
    /// Remote store holds the file.
    Active,
    /// Neither the remote store nor a backup holds the file.
    Failed,
    /// Soft-removed; retained for audit until purged.
    Deleted,
}

impl AttachmentStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingUpload => "pending_upload",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_upload" => Some(Self::PendingUpload),
            "active" => Some(Self::Active),
            "failed" => Some(Self::Failed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns true if no transition leaves this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// State machine guard: whether `self` → `to` is a legal transition.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        match (self, to) {
            (Self::PendingUpload, Self::Active | Self::Failed)
            | (Self::Active, Self::PendingUpload | Self::Failed) => true,
            (from, Self::Deleted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a backup payload was derived from the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Resized, re-encoded image.
    Thumbnail,
    /// Gzip-compressed byte prefix of a document.
    Compressed,
    /// Raw head-bytes snippet.
    Snippet,
}

impl BackupKind {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Compressed => "compressed",
            Self::Snippet => "snippet",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumbnail" => Some(Self::Thumbnail),
            "compressed" => Some(Self::Compressed),
            "snippet" => Some(Self::Snippet),
            _ => None,
        }
    }
}

/// Attachment metadata.
///
/// This is the read model: it reports whether a backup exists but never
/// carries the payload bytes. Those are reachable only through the store's
/// dedicated backup fetch, surfaced by the manager's preview operation.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Unique identifier.
    pub id: Uuid,
    /// Organization ID.
    pub organization_id: Uuid,
    /// Kind of the owning business entity (task, project, expense, ...).
    /// A weak reference: owner kinds are heterogeneous, so this is not
    /// foreign-key enforced.
    pub owner_type: String,
    /// ID of the owning business entity.
    pub owner_id: Uuid,
    /// Original filename.
    pub file_name: String,
    /// MIME type.
    pub mime_type: String,
    /// File size in bytes.
    pub file_size: i64,
    /// Public URL in the remote store, when uploaded.
    pub remote_url: Option<String>,
    /// Remote object identifier, when uploaded.
    pub remote_object_id: Option<String>,
    /// Whether a backup payload is held locally.
    pub backup_available: bool,
    /// How the backup was derived, when one exists.
    pub backup_kind: Option<BackupKind>,
    /// Lifecycle status.
    pub status: AttachmentStatus,
    /// User who uploaded, when known.
    pub uploaded_by: Option<Uuid>,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Last successful remote verification.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Soft-delete timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A backup payload fetched from the store.
#[derive(Debug, Clone)]
pub struct BackupData {
    /// Stored payload. Gzip-compressed when `kind` is `Compressed`.
    pub bytes: Vec<u8>,
    /// How the payload was derived.
    pub kind: BackupKind,
}

/// Input for uploading a new attachment.
#[derive(Debug, Clone)]
pub struct UploadInput {
    /// Organization ID.
    pub organization_id: Uuid,
    /// Kind of the owning business entity.
    pub owner_type: String,
    /// ID of the owning business entity.
    pub owner_id: Uuid,
    /// Original filename.
    pub file_name: String,
    /// MIME type of the file.
    pub mime_type: String,
    /// Raw file bytes.
    pub data: Bytes,
    /// User performing the upload, when known.
    pub uploaded_by: Option<Uuid>,
}

/// Result of an upload request.
///
/// An upload always resolves to a definite status plus whether a usable
/// preview exists; degraded-but-recoverable outcomes are not errors.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Generated attachment ID.
    pub attachment_id: Uuid,
    /// Resulting lifecycle status.
    pub status: AttachmentStatus,
    /// Public URL, when the remote put succeeded.
    pub remote_url: Option<String>,
    /// Whether a preview/backup is available.
    pub preview_available: bool,
}

/// Input for creating an attachment record.
#[derive(Debug, Clone)]
pub struct CreateAttachmentInput {
    /// Attachment ID.
    pub id: Uuid,
    /// Organization ID.
    pub organization_id: Uuid,
    /// Kind of the owning business entity.
    pub owner_type: String,
    /// ID of the owning business entity.
    pub owner_id: Uuid,
    /// Original filename.
    pub file_name: String,
    /// MIME type.
    pub mime_type: String,
    /// File size in bytes.
    pub file_size: i64,
    /// Remote URL, when the put succeeded.
    pub remote_url: Option<String>,
    /// Remote object identifier, when the put succeeded.
    pub remote_object_id: Option<String>,
    /// Backup payload, when one was generated.
    pub backup: Option<BackupData>,
    /// Initial lifecycle status.
    pub status: AttachmentStatus,
    /// User performing the upload, when known.
    pub uploaded_by: Option<Uuid>,
}

/// Upload limits enforced by the attachment manager.
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,
}

impl AttachmentConfig {
    /// Default max file size: 10 MiB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

    /// Set maximum file size.
    #[must_use]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
        }
    }
}
