//! Attachment repository for database operations.
//!
//! Implements the core `AttachmentStore` trait using SeaORM. Status changes
//! are conditional updates filtered on the expected current status, so a
//! stale writer affects zero rows instead of clobbering a newer state.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entities::{
    attachments, sea_orm_active_enums::AttachmentStatus as DbStatus,
    sea_orm_active_enums::BackupKind as DbBackupKind,
};
use crate::repositories::outbox::new_event_model;
use worklane_core::attachment::{
    Attachment, AttachmentError, AttachmentStatus, AttachmentStore, BackupData, BackupKind,
    CreateAttachmentInput,
};
use worklane_core::outbox::NewOutboxEvent;

/// Attachment repository implementation.
#[derive(Debug, Clone)]
pub struct AttachmentRepository {
    pub(crate) db: DatabaseConnection,
}

impl AttachmentRepository {
    /// Create a new attachment repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl AttachmentStore for AttachmentRepository {
    async fn create_with_event(
        &self,
        input: CreateAttachmentInput,
        event: Option<NewOutboxEvent>,
    ) -> Result<Attachment, AttachmentError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        let active_model = attachments::ActiveModel {
            id: Set(input.id),
            organization_id: Set(input.organization_id),
            owner_type: Set(input.owner_type.clone()),
            owner_id: Set(input.owner_id),
            file_name: Set(input.file_name.clone()),
            mime_type: Set(input.mime_type.clone()),
            file_size: Set(input.file_size),
            remote_url: Set(input.remote_url.clone()),
            remote_object_id: Set(input.remote_object_id.clone()),
            backup_payload: Set(input.backup.as_ref().map(|b| b.bytes.clone())),
            backup_kind: Set(input.backup.as_ref().map(|b| to_db_backup_kind(b.kind))),
            backup_available: Set(input.backup.is_some()),
            status: Set(to_db_status(input.status)),
            uploaded_by: Set(input.uploaded_by),
            uploaded_at: Set(Utc::now().into()),
            last_verified_at: Set(None),
            deleted_at: Set(None),
        };

        let model = active_model
            .insert(&txn)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        if let Some(event) = event {
            new_event_model(&event)?
                .insert(&txn)
                .await
                .map_err(|e| AttachmentError::repository(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(to_domain(model))
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Attachment>, AttachmentError> {
        let model = attachments::Entity::find_by_id(id)
            .filter(attachments::Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn list_by_owner(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let models = attachments::Entity::find()
            .filter(attachments::Column::OwnerType.eq(owner_type))
            .filter(attachments::Column::OwnerId.eq(owner_id))
            .filter(attachments::Column::OrganizationId.eq(organization_id))
            .order_by_desc(attachments::Column::UploadedAt)
            .all(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(models.into_iter().map(to_domain).collect())
    }

    async fn fetch_backup(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<BackupData>, AttachmentError> {
        let model = attachments::Entity::find_by_id(id)
            .filter(attachments::Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(model.and_then(|m| match (m.backup_payload, m.backup_kind) {
            (Some(bytes), Some(kind)) => Some(BackupData {
                bytes,
                kind: from_db_backup_kind(&kind),
            }),
            _ => None,
        }))
    }

    async fn mark_deleted(
        &self,
        id: Uuid,
        organization_id: Uuid,
        event: Option<NewOutboxEvent>,
    ) -> Result<bool, AttachmentError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        let update = attachments::ActiveModel {
            status: Set(DbStatus::Deleted),
            deleted_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };

        let result = attachments::Entity::update_many()
            .set(update)
            .filter(attachments::Column::Id.eq(id))
            .filter(attachments::Column::OrganizationId.eq(organization_id))
            .filter(attachments::Column::Status.ne(DbStatus::Deleted))
            .exec(&txn)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        if result.rows_affected == 0 {
            txn.commit()
                .await
                .map_err(|e| AttachmentError::repository(e.to_string()))?;
            return Ok(false);
        }

        if let Some(event) = event {
            new_event_model(&event)?
                .insert(&txn)
                .await
                .map_err(|e| AttachmentError::repository(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(true)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: AttachmentStatus,
        to: AttachmentStatus,
    ) -> Result<bool, AttachmentError> {
        let mut update = attachments::ActiveModel {
            status: Set(to_db_status(to)),
            ..Default::default()
        };

        // Leaving active means the remote object is missing or abandoned.
        if from == AttachmentStatus::Active {
            update.remote_url = Set(None);
            update.remote_object_id = Set(None);
        }
        // Failed is bare: no remote location, no advertised backup. The
        // payload bytes stay behind for manual recovery.
        if to == AttachmentStatus::Failed {
            update.remote_url = Set(None);
            update.remote_object_id = Set(None);
            update.backup_available = Set(false);
            update.backup_kind = Set(None);
        }

        let result = attachments::Entity::update_many()
            .set(update)
            .filter(attachments::Column::Id.eq(id))
            .filter(attachments::Column::Status.eq(to_db_status(from)))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn promote_to_active(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_object_id: &str,
    ) -> Result<bool, AttachmentError> {
        let update = attachments::ActiveModel {
            status: Set(DbStatus::Active),
            remote_url: Set(Some(remote_url.to_string())),
            remote_object_id: Set(Some(remote_object_id.to_string())),
            ..Default::default()
        };

        let result = attachments::Entity::update_many()
            .set(update)
            .filter(attachments::Column::Id.eq(id))
            .filter(attachments::Column::Status.eq(DbStatus::PendingUpload))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn set_last_verified(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        let update = attachments::ActiveModel {
            last_verified_at: Set(Some(at.into())),
            ..Default::default()
        };

        attachments::Entity::update_many()
            .set(update)
            .filter(attachments::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(())
    }

    async fn purge_deleted(
        &self,
        organization_id: Option<Uuid>,
        before: DateTime<Utc>,
    ) -> Result<u64, AttachmentError> {
        let mut query = attachments::Entity::delete_many()
            .filter(attachments::Column::Status.eq(DbStatus::Deleted))
            .filter(attachments::Column::DeletedAt.lt(before));

        if let Some(org) = organization_id {
            query = query.filter(attachments::Column::OrganizationId.eq(org));
        }

        let result = query
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

/// Convert domain status to database enum.
fn to_db_status(status: AttachmentStatus) -> DbStatus {
    match status {
        AttachmentStatus::PendingUpload => DbStatus::PendingUpload,
        AttachmentStatus::Active => DbStatus::Active,
        AttachmentStatus::Failed => DbStatus::Failed,
        AttachmentStatus::Deleted => DbStatus::Deleted,
    }
}

/// Convert database status to domain enum.
fn from_db_status(status: &DbStatus) -> AttachmentStatus {
    match status {
        DbStatus::PendingUpload => AttachmentStatus::PendingUpload,
        DbStatus::Active => AttachmentStatus::Active,
        DbStatus::Failed => AttachmentStatus::Failed,
        DbStatus::Deleted => AttachmentStatus::Deleted,
    }
}

/// Convert domain backup kind to database enum.
fn to_db_backup_kind(kind: BackupKind) -> DbBackupKind {
    match kind {
        BackupKind::Thumbnail => DbBackupKind::Thumbnail,
        BackupKind::Compressed => DbBackupKind::Compressed,
        BackupKind::Snippet => DbBackupKind::Snippet,
    }
}

/// Convert database backup kind to domain enum.
fn from_db_backup_kind(kind: &DbBackupKind) -> BackupKind {
    match kind {
        DbBackupKind::Thumbnail => BackupKind::Thumbnail,
        DbBackupKind::Compressed => BackupKind::Compressed,
        DbBackupKind::Snippet => BackupKind::Snippet,
    }
}

/// Convert database model to the domain read model.
///
/// The backup payload deliberately does not cross this boundary; metadata
/// reads only learn that a backup exists.
fn to_domain(model: attachments::Model) -> Attachment {
    Attachment {
        id: model.id,
        organization_id: model.organization_id,
        owner_type: model.owner_type,
        owner_id: model.owner_id,
        file_name: model.file_name,
        mime_type: model.mime_type,
        file_size: model.file_size,
        remote_url: model.remote_url,
        remote_object_id: model.remote_object_id,
        backup_available: model.backup_available,
        backup_kind: model.backup_kind.as_ref().map(from_db_backup_kind),
        status: from_db_status(&model.status),
        uploaded_by: model.uploaded_by,
        uploaded_at: model.uploaded_at.with_timezone(&Utc),
        last_verified_at: model.last_verified_at.map(|t| t.with_timezone(&Utc)),
        deleted_at: model.deleted_at.map(|t| t.with_timezone(&Utc)),
    }
}
