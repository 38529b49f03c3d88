//! Initial database migration.
//!
//! Creates the attachment and outbox tables, their enums, and indexes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TABLES
        // ============================================================
        db.execute_unprepared(ATTACHMENTS_SQL).await?;
        db.execute_unprepared(OUTBOX_EVENTS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
-- Attachment lifecycle status
CREATE TYPE attachment_status AS ENUM (
    'pending_upload',
    'active',
    'failed',
    'deleted'
);

-- Backup payload derivation kind
CREATE TYPE backup_kind AS ENUM ('thumbnail', 'compressed', 'snippet');

-- Outbox event classification
CREATE TYPE outbox_event_type AS ENUM (
    'verify_upload',
    'retry_upload',
    'delete_remote'
);
";

const ATTACHMENTS_SQL: &str = r"
CREATE TABLE attachments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    -- Weak owner reference: owner kinds are heterogeneous, no FK
    owner_type VARCHAR(50) NOT NULL,
    owner_id UUID NOT NULL,
    file_name VARCHAR(255) NOT NULL,
    mime_type VARCHAR(100) NOT NULL,
    file_size BIGINT NOT NULL,
    remote_url VARCHAR(1000),
    remote_object_id VARCHAR(600),
    backup_payload BYTEA,
    backup_kind backup_kind,
    backup_available BOOLEAN NOT NULL DEFAULT FALSE,
    status attachment_status NOT NULL DEFAULT 'pending_upload',
    uploaded_by UUID,
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_verified_at TIMESTAMPTZ,
    deleted_at TIMESTAMPTZ,
    CONSTRAINT chk_file_size CHECK (file_size >= 0),
    CONSTRAINT chk_active_has_remote CHECK (
        status <> 'active' OR remote_url IS NOT NULL
    ),
    CONSTRAINT chk_failed_is_bare CHECK (
        status <> 'failed' OR (remote_url IS NULL AND backup_available = FALSE)
    ),
    CONSTRAINT chk_backup_consistent CHECK (
        backup_available = FALSE
        OR (backup_payload IS NOT NULL AND backup_kind IS NOT NULL)
    )
);

CREATE INDEX idx_attachments_owner ON attachments(owner_type, owner_id);
CREATE INDEX idx_attachments_org ON attachments(organization_id);
CREATE INDEX idx_attachments_deleted ON attachments(deleted_at) WHERE status = 'deleted';
";

const OUTBOX_EVENTS_SQL: &str = r"
CREATE TABLE outbox_events (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    attachment_id UUID NOT NULL REFERENCES attachments(id) ON DELETE CASCADE,
    organization_id UUID NOT NULL,
    event_type outbox_event_type NOT NULL,
    payload JSONB NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ,
    CONSTRAINT chk_attempts CHECK (attempts >= 0)
);

CREATE INDEX idx_outbox_due ON outbox_events(next_attempt_at) WHERE processed_at IS NULL;
CREATE INDEX idx_outbox_attachment ON outbox_events(attachment_id);
CREATE INDEX idx_outbox_org ON outbox_events(organization_id);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS outbox_events;
DROP TABLE IF EXISTS attachments;
DROP TYPE IF EXISTS outbox_event_type;
DROP TYPE IF EXISTS backup_kind;
DROP TYPE IF EXISTS attachment_status;
";
