//! In-memory store and blob doubles shared by the manager and processor tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::AttachmentError;
use super::service::AttachmentStore;
use super::types::{Attachment, AttachmentStatus, BackupData, CreateAttachmentInput};
use crate::outbox::{NewOutboxEvent, OutboxEvent, OutboxLog};
use crate::storage::{BlobError, BlobStore, StoredObject};

/// In-memory attachment store + outbox log.
pub(crate) struct MockStore {
    rows: Mutex<HashMap<Uuid, (Attachment, Option<BackupData>)>>,
    events: Mutex<Vec<OutboxEvent>>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attachment(&self, id: Uuid) -> Option<Attachment> {
        self.rows.lock().unwrap().get(&id).map(|(a, _)| a.clone())
    }

    pub(crate) fn rows_len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub(crate) fn events(&self) -> Vec<OutboxEvent> {
        self.events.lock().unwrap().clone()
    }

    fn append_event(&self, event: NewOutboxEvent) {
        let organization_id = event.organization_id();
        self.events.lock().unwrap().push(OutboxEvent {
            id: event.id,
            attachment_id: event.attachment_id,
            organization_id,
            payload: event.payload,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            next_attempt_at: Utc::now(),
            processed_at: None,
        });
    }
}

impl AttachmentStore for MockStore {
    async fn create_with_event(
        &self,
        input: CreateAttachmentInput,
        event: Option<NewOutboxEvent>,
    ) -> Result<Attachment, AttachmentError> {
        let attachment = Attachment {
            id: input.id,
            organization_id: input.organization_id,
            owner_type: input.owner_type,
            owner_id: input.owner_id,
            file_name: input.file_name,
            mime_type: input.mime_type,
            file_size: input.file_size,
            remote_url: input.remote_url,
            remote_object_id: input.remote_object_id,
            backup_available: input.backup.is_some(),
            backup_kind: input.backup.as_ref().map(|b| b.kind),
            status: input.status,
            uploaded_by: input.uploaded_by,
            uploaded_at: Utc::now(),
            last_verified_at: None,
            deleted_at: None,
        };
        self.rows
            .lock()
            .unwrap()
            .insert(attachment.id, (attachment.clone(), input.backup));
        if let Some(event) = event {
            self.append_event(event);
        }
        Ok(attachment)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Attachment>, AttachmentError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|(a, _)| a.organization_id == organization_id)
            .map(|(a, _)| a.clone()))
    }

    async fn list_by_owner(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|(a, _)| {
                a.owner_type == owner_type
                    && a.owner_id == owner_id
                    && a.organization_id == organization_id
            })
            .map(|(a, _)| a.clone())
            .collect())
    }

    async fn fetch_backup(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<BackupData>, AttachmentError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|(a, _)| a.organization_id == organization_id)
            .and_then(|(_, b)| b.clone()))
    }

    async fn mark_deleted(
        &self,
        id: Uuid,
        organization_id: Uuid,
        event: Option<NewOutboxEvent>,
    ) -> Result<bool, AttachmentError> {
        let mut rows = self.rows.lock().unwrap();
        let Some((attachment, _)) = rows
            .get_mut(&id)
            .filter(|(a, _)| a.organization_id == organization_id)
        else {
            return Ok(false);
        };

        if attachment.status == AttachmentStatus::Deleted {
            return Ok(false);
        }
        attachment.status = AttachmentStatus::Deleted;
        attachment.deleted_at = Some(Utc::now());
        drop(rows);

        if let Some(event) = event {
            self.append_event(event);
        }
        Ok(true)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: AttachmentStatus,
        to: AttachmentStatus,
    ) -> Result<bool, AttachmentError> {
        let mut rows = self.rows.lock().unwrap();
        let Some((attachment, _)) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if attachment.status != from {
            return Ok(false);
        }
        attachment.status = to;
        if from == AttachmentStatus::Active {
            attachment.remote_url = None;
            attachment.remote_object_id = None;
        }
        if to == AttachmentStatus::Failed {
            attachment.remote_url = None;
            attachment.remote_object_id = None;
            attachment.backup_available = false;
            attachment.backup_kind = None;
        }
        Ok(true)
    }

    async fn promote_to_active(
        &self,
        id: Uuid,
        remote_url: &str,
        remote_object_id: &str,
    ) -> Result<bool, AttachmentError> {
        let mut rows = self.rows.lock().unwrap();
        let Some((attachment, _)) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if attachment.status != AttachmentStatus::PendingUpload {
            return Ok(false);
        }
        attachment.status = AttachmentStatus::Active;
        attachment.remote_url = Some(remote_url.to_string());
        attachment.remote_object_id = Some(remote_object_id.to_string());
        Ok(true)
    }

    async fn set_last_verified(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        if let Some((attachment, _)) = self.rows.lock().unwrap().get_mut(&id) {
            attachment.last_verified_at = Some(at);
        }
        Ok(())
    }

    async fn purge_deleted(
        &self,
        organization_id: Option<Uuid>,
        before: DateTime<Utc>,
    ) -> Result<u64, AttachmentError> {
        let mut rows = self.rows.lock().unwrap();
        let purged: Vec<Uuid> = rows
            .values()
            .filter(|(a, _)| {
                organization_id.is_none_or(|org| a.organization_id == org)
                    && a.status == AttachmentStatus::Deleted
                    && a.deleted_at.is_some_and(|at| at < before)
            })
            .map(|(a, _)| a.id)
            .collect();
        for id in &purged {
            rows.remove(id);
        }
        drop(rows);

        self.events
            .lock()
            .unwrap()
            .retain(|e| !purged.contains(&e.attachment_id));
        Ok(purged.len() as u64)
    }
}

impl OutboxLog for MockStore {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<(), AttachmentError> {
        self.append_event(event);
        Ok(())
    }

    async fn fetch_due(
        &self,
        limit: u64,
        organization_id: Option<Uuid>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<OutboxEvent>, AttachmentError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.processed_at.is_none())
            .filter(|e| e.attempts < max_attempts)
            .filter(|e| e.next_attempt_at <= now)
            .filter(|e| organization_id.is_none_or(|org| e.organization_id == org))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn mark_processed(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        if let Some(event) = self
            .events
            .lock()
            .unwrap()
            .iter_mut()
            .find(|e| e.id == event_id)
        {
            event.processed_at = Some(at);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        if let Some(event) = self
            .events
            .lock()
            .unwrap()
            .iter_mut()
            .find(|e| e.id == event_id)
        {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
            event.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }
}

/// In-memory blob store with injectable failures.
pub(crate) struct MockBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_ops: AtomicBool,
    put_count: AtomicUsize,
}

impl MockBlobStore {
    pub(crate) fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_ops: AtomicBool::new(false),
            put_count: AtomicUsize::new(0),
        }
    }

    /// Make every `put` fail with a transient error.
    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make `exists`/`delete` fail with a transient error.
    pub(crate) fn fail_ops(&self, fail: bool) {
        self.fail_ops.store(fail, Ordering::SeqCst);
    }

    /// Remove an object out-of-band, simulating remote drift.
    pub(crate) fn remove_object(&self, object_id: &str) {
        self.objects.lock().unwrap().remove(object_id);
    }

    pub(crate) fn contains(&self, object_id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(object_id)
    }

    pub(crate) fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }
}

impl BlobStore for MockBlobStore {
    async fn put(&self, key: &str, payload: Bytes) -> Result<StoredObject, BlobError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::unavailable("injected put failure"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.to_vec());
        Ok(StoredObject {
            url: format!("https://files.test/{key}"),
            object_id: key.to_string(),
        })
    }

    async fn exists(&self, object_id: &str) -> Result<bool, BlobError> {
        if self.fail_ops.load(Ordering::SeqCst) {
            return Err(BlobError::unavailable("injected stat failure"));
        }
        Ok(self.objects.lock().unwrap().contains_key(object_id))
    }

    async fn delete(&self, object_id: &str) -> Result<(), BlobError> {
        if self.fail_ops.load(Ordering::SeqCst) {
            return Err(BlobError::unavailable("injected delete failure"));
        }
        self.objects.lock().unwrap().remove(object_id);
        Ok(())
    }
}
