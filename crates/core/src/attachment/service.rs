//! Attachment manager implementation.
//!
//! The manager is the only component callers interact with synchronously. An
//! upload is a dual write that cannot be transactional: the remote put and
//! the local insert are combined into a definite status, and a durable outbox
//! event carries the follow-up work. The call never loses the uploaded bytes
//! silently - either the remote store has them, a backup has them, or the
//! result explicitly reports `failed`.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::AttachmentError;
use super::types::{
    Attachment, AttachmentConfig, AttachmentStatus, BackupData, CreateAttachmentInput, UploadInput,
    UploadOutcome,
};
use crate::outbox::{EventPayload, NewOutboxEvent};
use crate::preview::PreviewGenerator;
use crate::storage::{BlobStore, build_object_key};

/// Persistence trait for attachments.
///
/// Implemented by the db crate. Mutating methods that pair a row change with
/// an outbox event run both in one local transaction; status changes are
/// compare-and-set on the expected current status so concurrent processor
/// runs degrade to no-ops.
pub trait AttachmentStore: Send + Sync {
    /// Insert an attachment row and, atomically, its outbox event.
    fn create_with_event(
        &self,
        input: CreateAttachmentInput,
        event: Option<NewOutboxEvent>,
    ) -> impl Future<Output = Result<Attachment, AttachmentError>> + Send;

    /// Find attachment by ID within an organization.
    fn find_by_id(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Option<Attachment>, AttachmentError>> + Send;

    /// List attachments belonging to a business entity.
    fn list_by_owner(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Attachment>, AttachmentError>> + Send;

    /// Fetch the backup payload, if one is held.
    fn fetch_backup(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Option<BackupData>, AttachmentError>> + Send;

    /// Soft-delete an attachment and, atomically, enqueue a follow-up event.
    ///
    /// Returns `false` when the row was already deleted.
    fn mark_deleted(
        &self,
        id: Uuid,
        organization_id: Uuid,
        event: Option<NewOutboxEvent>,
    ) -> impl Future<Output = Result<bool, AttachmentError>> + Send;

    /// Compare-and-set status transition. Returns whether it applied.
    ///
    /// Invariant upkeep happens here: leaving `active` clears the remote
    /// location (the object is missing or being abandoned), and entering
    /// `failed` additionally clears backup availability. The backup payload
    /// bytes are retained for manual recovery.
    fn transition_status(
        &self,
        id: Uuid,
        from: AttachmentStatus,
        to: AttachmentStatus,
    ) -> impl Future<Output = Result<bool, AttachmentError>> + Send;

    /// Promote a pending attachment to active, recording its remote
    /// location. Compare-and-set from `pending_upload`; returns whether it
    /// applied.
    fn promote_to_active(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_object_id: &str,
    ) -> impl Future<Output = Result<bool, AttachmentError>> + Send;

    /// Record a successful remote verification.
    fn set_last_verified(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;

    /// Hard-delete soft-deleted rows older than the cutoff, optionally
    /// scoped to one organization. Returns the number of rows removed.
    fn purge_deleted(
        &self,
        organization_id: Option<Uuid>,
        before: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AttachmentError>> + Send;
}

/// Attachment manager: upload, delete, and retrieval orchestration.
pub struct AttachmentManager<S: AttachmentStore, B: BlobStore> {
    store: Arc<S>,
    blob: Arc<B>,
    preview: PreviewGenerator,
    config: AttachmentConfig,
}

impl<S: AttachmentStore, B: BlobStore> AttachmentManager<S, B> {
    /// Create a new attachment manager.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        blob: Arc<B>,
        preview: PreviewGenerator,
        config: AttachmentConfig,
    ) -> Self {
        Self {
            store,
            blob,
            preview,
            config,
        }
    }

    /// Upload a file.
    ///
    /// Attempts the remote put first; regardless of its outcome a degraded
    /// backup is generated, and the combined result decides the stored
    /// status:
    /// - remote ok → `active` (plus a verify-upload event)
    /// - remote failed, backup ok → `pending_upload` (plus a retry-upload event)
    /// - both failed → `failed` (caller may re-submit)
    ///
    /// The caller is never blocked on remote verification.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` above the configured size limit, or a
    /// repository error if the local insert fails.
    pub async fn upload(&self, input: UploadInput) -> Result<UploadOutcome, AttachmentError> {
        let size = input.data.len() as u64;
        if size > self.config.max_file_size {
            return Err(AttachmentError::payload_too_large(
                size,
                self.config.max_file_size,
            ));
        }

        let attachment_id = Uuid::new_v4();
        let key = build_object_key(
            input.organization_id,
            &input.owner_type,
            input.owner_id,
            attachment_id,
            &input.file_name,
        );

        let remote = match self.blob.put(&key, input.data.clone()).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(
                    %attachment_id,
                    organization_id = %input.organization_id,
                    error = %e,
                    "remote put failed, falling back to local backup"
                );
                None
            }
        };

        let backup = if remote.is_some() {
            self.preview.generate(&input.data, &input.mime_type)
        } else {
            self.preview
                .generate_best_effort(&input.data, &input.mime_type)
        };

        let status = match (&remote, &backup) {
            (Some(_), _) => AttachmentStatus::Active,
            (None, Some(_)) => AttachmentStatus::PendingUpload,
            (None, None) => AttachmentStatus::Failed,
        };

        let event = match status {
            AttachmentStatus::Active => {
                let object_id = remote
                    .as_ref()
                    .map(|r| r.object_id.clone())
                    .unwrap_or_default();
                Some(NewOutboxEvent::new(
                    attachment_id,
                    EventPayload::VerifyUpload {
                        organization_id: input.organization_id,
                        object_id,
                    },
                ))
            }
            AttachmentStatus::PendingUpload => Some(NewOutboxEvent::new(
                attachment_id,
                EventPayload::RetryUpload {
                    organization_id: input.organization_id,
                    owner_type: input.owner_type.clone(),
                    owner_id: input.owner_id,
                },
            )),
            AttachmentStatus::Failed | AttachmentStatus::Deleted => None,
        };

        let create = CreateAttachmentInput {
            id: attachment_id,
            organization_id: input.organization_id,
            owner_type: input.owner_type.clone(),
            owner_id: input.owner_id,
            file_name: input.file_name.clone(),
            mime_type: input.mime_type.clone(),
            file_size: i64::try_from(size).unwrap_or(i64::MAX),
            remote_url: remote.as_ref().map(|r| r.url.clone()),
            remote_object_id: remote.as_ref().map(|r| r.object_id.clone()),
            backup: backup.map(|p| BackupData {
                bytes: p.bytes,
                kind: p.kind,
            }),
            status,
            uploaded_by: input.uploaded_by,
        };

        let attachment = self.store.create_with_event(create, event).await?;

        info!(
            target: "worklane::audit",
            attachment_id = %attachment.id,
            organization_id = %attachment.organization_id,
            owner_type = %attachment.owner_type,
            owner_id = %attachment.owner_id,
            status = %attachment.status,
            file_size = attachment.file_size,
            backup_available = attachment.backup_available,
            "attachment uploaded"
        );

        Ok(UploadOutcome {
            attachment_id: attachment.id,
            status: attachment.status,
            remote_url: attachment.remote_url,
            preview_available: attachment.backup_available,
        })
    }

    /// Soft-delete an attachment.
    ///
    /// The remote object, if any, is removed asynchronously through a
    /// delete-remote outbox event; the local delete never blocks on or fails
    /// because of the remote store. Deleting an already-deleted attachment is
    /// a no-op success.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such attachment exists.
    pub async fn delete(&self, id: Uuid, organization_id: Uuid) -> Result<(), AttachmentError> {
        let attachment = self
            .store
            .find_by_id(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::not_found(id))?;

        if attachment.status.is_terminal() {
            return Ok(());
        }

        let event = attachment.remote_object_id.as_ref().map(|object_id| {
            NewOutboxEvent::new(
                id,
                EventPayload::DeleteRemote {
                    organization_id,
                    object_id: object_id.clone(),
                },
            )
        });

        self.store.mark_deleted(id, organization_id, event).await?;

        info!(
            target: "worklane::audit",
            attachment_id = %id,
            organization_id = %organization_id,
            "attachment deleted"
        );

        Ok(())
    }

    /// Soft-delete every attachment of a business entity (cascading
    /// cleanup). Returns the number of attachments deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_by_owner(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        organization_id: Uuid,
    ) -> Result<u64, AttachmentError> {
        let attachments = self
            .store
            .list_by_owner(owner_type, owner_id, organization_id)
            .await?;

        let mut deleted = 0u64;
        for attachment in attachments {
            if attachment.status == AttachmentStatus::Deleted {
                continue;
            }

            let event = attachment.remote_object_id.as_ref().map(|object_id| {
                NewOutboxEvent::new(
                    attachment.id,
                    EventPayload::DeleteRemote {
                        organization_id,
                        object_id: object_id.clone(),
                    },
                )
            });

            if self
                .store
                .mark_deleted(attachment.id, organization_id, event)
                .await?
            {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Get attachment metadata. Never exposes the backup payload.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such attachment exists.
    pub async fn get_metadata(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Attachment, AttachmentError> {
        self.store
            .find_by_id(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::not_found(id))
    }

    /// List attachments for a business entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_by_owner(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        self.store
            .list_by_owner(owner_type, owner_id, organization_id)
            .await
    }

    /// Fetch the preview payload, decompressing `compressed` backups.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such attachment exists, `PreviewUnavailable`
    /// if no backup is held.
    pub async fn get_preview(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<u8>, AttachmentError> {
        let attachment = self
            .store
            .find_by_id(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::not_found(id))?;

        if !attachment.backup_available {
            return Err(AttachmentError::preview_unavailable(id));
        }

        let backup = self
            .store
            .fetch_backup(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::preview_unavailable(id))?;

        match backup.kind {
            super::types::BackupKind::Compressed => {
                self.preview.decompress(&backup.bytes).map_err(|e| {
                    warn!(attachment_id = %id, error = %e, "stored backup unreadable");
                    AttachmentError::preview_unavailable(id)
                })
            }
            _ => Ok(backup.bytes),
        }
    }

    /// Re-attempt the remote upload from the stored backup.
    ///
    /// Only valid while `pending_upload`. A failure is reported to the
    /// caller, not retried here - the outbox processor owns retry cadence.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTransition` when not pending,
    /// `PreviewUnavailable` when no backup is held, or the blob store error
    /// when the put fails.
    pub async fn retry(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<AttachmentStatus, AttachmentError> {
        let attachment = self
            .store
            .find_by_id(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::not_found(id))?;

        if !attachment.status.can_transition(AttachmentStatus::Active) {
            return Err(AttachmentError::invalid_transition(
                attachment.status,
                AttachmentStatus::Active,
            ));
        }

        let backup = self
            .store
            .fetch_backup(id, organization_id)
            .await?
            .ok_or_else(|| AttachmentError::preview_unavailable(id))?;

        let key = build_object_key(
            attachment.organization_id,
            &attachment.owner_type,
            attachment.owner_id,
            attachment.id,
            &attachment.file_name,
        );

        let stored = self.blob.put(&key, Bytes::from(backup.bytes)).await?;

        let applied = self
            .store
            .promote_to_active(id, &stored.url, &stored.object_id)
            .await?;

        if !applied {
            // Lost a race with the processor or a delete; report, don't loop.
            return Err(AttachmentError::invalid_transition(
                AttachmentStatus::PendingUpload,
                AttachmentStatus::Active,
            ));
        }

        info!(
            target: "worklane::audit",
            attachment_id = %id,
            organization_id = %organization_id,
            "attachment promoted to active by caller retry"
        );

        Ok(AttachmentStatus::Active)
    }

    /// Hard-delete soft-deleted attachments older than the cutoff.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn purge(
        &self,
        organization_id: Option<Uuid>,
        before: DateTime<Utc>,
    ) -> Result<u64, AttachmentError> {
        let purged = self.store.purge_deleted(organization_id, before).await?;
        if purged > 0 {
            info!(
                target: "worklane::audit",
                organization_id = ?organization_id,
                purged,
                "purged soft-deleted attachments"
            );
        }
        Ok(purged)
    }
}
