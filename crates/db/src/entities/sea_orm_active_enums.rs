//! Postgres enum mappings.

use sea_orm::entity::prelude::*;

/// Attachment lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attachment_status")]
pub enum AttachmentStatus {
    /// Remote store does not (yet) hold the file.
    #[sea_orm(string_value = "pending_upload")]
    PendingUpload,
    /// Remote store holds the file.
    #[sea_orm(string_value = "active")]
    Active,
    /// Neither store holds a usable copy.
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Soft-removed.
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

/// Backup payload derivation kind.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "backup_kind")]
pub enum BackupKind {
    /// Resized, re-encoded image.
    #[sea_orm(string_value = "thumbnail")]
    Thumbnail,
    /// Gzip-compressed byte prefix.
    #[sea_orm(string_value = "compressed")]
    Compressed,
    /// Raw head-bytes snippet.
    #[sea_orm(string_value = "snippet")]
    Snippet,
}

/// Outbox event classification.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "outbox_event_type")]
pub enum OutboxEventType {
    /// Confirm a completed upload reached the remote store.
    #[sea_orm(string_value = "verify_upload")]
    VerifyUpload,
    /// Re-attempt a remote upload from the stored backup.
    #[sea_orm(string_value = "retry_upload")]
    RetryUpload,
    /// Remove a remote object after a local soft-delete.
    #[sea_orm(string_value = "delete_remote")]
    DeleteRemote,
}
