//! `SeaORM` Entity for the attachments table.

use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{AttachmentStatus, BackupKind};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "attachments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub owner_type: String,
    pub owner_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub remote_url: Option<String>,
    pub remote_object_id: Option<String>,
    pub backup_payload: Option<Vec<u8>>,
    pub backup_kind: Option<BackupKind>,
    pub backup_available: bool,
    pub status: AttachmentStatus,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTimeWithTimeZone,
    pub last_verified_at: Option<DateTimeWithTimeZone>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::outbox_events::Entity")]
    OutboxEvents,
}

impl Related<super::outbox_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OutboxEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
