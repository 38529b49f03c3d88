//! Outbox batch processor.
//!
//! Drains due outbox events, reconciling the remote store with the local
//! records. Invoked externally (cron or an explicit trigger); it is not a
//! resident loop. Every transition re-reads current status and applies a
//! compare-and-set, so re-running an event after a crash, or overlapping
//! processor runs, degrade to no-ops instead of corrupting state. One
//! event's failure never aborts the rest of the batch.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{EventPayload, NewOutboxEvent, OutboxEvent};
use crate::attachment::{AttachmentError, AttachmentStatus, AttachmentStore};
use crate::storage::{BlobError, BlobStore, build_object_key};

/// Persistence trait for the outbox log.
///
/// Implemented by the db crate alongside [`AttachmentStore`].
pub trait OutboxLog: Send + Sync {
    /// Append a new event.
    fn enqueue(
        &self,
        event: NewOutboxEvent,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;

    /// Fetch unprocessed events that are due, under the attempt ceiling,
    /// optionally scoped to an organization.
    fn fetch_due(
        &self,
        limit: u64,
        organization_id: Option<Uuid>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> impl Future<Output = Result<Vec<OutboxEvent>, AttachmentError>> + Send;

    /// Mark an event completed.
    fn mark_processed(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;

    /// Record a failed attempt: increments the attempt counter, stores the
    /// error, and schedules the next attempt.
    fn record_failure(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;
}

/// Outbox processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum events handled per batch run.
    pub batch_limit: u64,
    /// Attempt ceiling before giving up on an event.
    pub max_attempts: u32,
    /// Base delay for the capped exponential backoff, in seconds.
    pub backoff_base_secs: u64,
    /// Upper bound on the backoff delay, in seconds.
    pub backoff_cap_secs: u64,
}

impl ProcessorConfig {
    /// Default batch size.
    pub const DEFAULT_BATCH_LIMIT: u64 = 50;
    /// Default attempt ceiling.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Default backoff base: 30 seconds.
    pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 30;
    /// Default backoff cap: 1 hour.
    pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 3600;

    /// Set the batch limit.
    #[must_use]
    pub fn with_batch_limit(mut self, limit: u64) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff base in seconds.
    #[must_use]
    pub fn with_backoff_base_secs(mut self, secs: u64) -> Self {
        self.backoff_base_secs = secs;
        self
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_limit: Self::DEFAULT_BATCH_LIMIT,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: Self::DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: Self::DEFAULT_BACKOFF_CAP_SECS,
        }
    }
}

/// Counters for a single batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Events fetched this run.
    pub fetched: u64,
    /// Uploads confirmed present remotely.
    pub verified: u64,
    /// Pending attachments promoted to active.
    pub promoted: u64,
    /// Active attachments demoted after a failed verification.
    pub demoted: u64,
    /// Remote objects removed.
    pub remote_deleted: u64,
    /// Events deferred to a later attempt.
    pub deferred: u64,
    /// Events discarded as no-ops by the state machine guard.
    pub skipped: u64,
    /// Retry events that hit the ceiling; attachment now failed.
    pub exhausted: u64,
    /// Delete events left outstanding for manual cleanup.
    pub orphaned: u64,
    /// Events that failed with a repository error.
    pub errors: u64,
}

/// Per-event processing outcome.
enum Outcome {
    Verified,
    Promoted,
    Demoted,
    RemoteDeleted,
    Deferred,
    Skipped,
    Exhausted,
    Orphaned,
}

impl BatchSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Verified => self.verified += 1,
            Outcome::Promoted => self.promoted += 1,
            Outcome::Demoted => self.demoted += 1,
            Outcome::RemoteDeleted => self.remote_deleted += 1,
            Outcome::Deferred => self.deferred += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Exhausted => self.exhausted += 1,
            Outcome::Orphaned => self.orphaned += 1,
        }
    }
}

/// Background worker that drains the outbox log.
pub struct OutboxProcessor<S, B>
where
    S: AttachmentStore + OutboxLog,
    B: BlobStore,
{
    store: Arc<S>,
    blob: Arc<B>,
    config: ProcessorConfig,
}

impl<S, B> OutboxProcessor<S, B>
where
    S: AttachmentStore + OutboxLog,
    B: BlobStore,
{
    /// Create a new outbox processor.
    #[must_use]
    pub fn new(store: Arc<S>, blob: Arc<B>, config: ProcessorConfig) -> Self {
        Self {
            store,
            blob,
            config,
        }
    }

    /// Process one bounded batch of due events.
    ///
    /// Per-event failures are recorded against the event and counted in the
    /// summary; they never propagate past the batch boundary.
    ///
    /// # Errors
    ///
    /// Returns an error only when the initial fetch from the log fails.
    pub async fn run_batch(
        &self,
        limit: Option<u64>,
        organization_id: Option<Uuid>,
    ) -> Result<BatchSummary, AttachmentError> {
        let limit = limit.unwrap_or(self.config.batch_limit);
        let events = self
            .store
            .fetch_due(limit, organization_id, Utc::now(), self.config.max_attempts)
            .await?;

        let mut summary = BatchSummary {
            fetched: events.len() as u64,
            ..BatchSummary::default()
        };

        for event in events {
            match self.process_event(&event).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    summary.errors += 1;
                    warn!(
                        event_id = %event.id,
                        attachment_id = %event.attachment_id,
                        error = %e,
                        "outbox event processing failed"
                    );
                    let next = Utc::now() + self.backoff(event.attempts);
                    if let Err(record_err) = self
                        .store
                        .record_failure(event.id, &e.to_string(), next)
                        .await
                    {
                        error!(
                            event_id = %event.id,
                            error = %record_err,
                            "failed to record outbox event failure"
                        );
                    }
                }
            }
        }

        info!(
            fetched = summary.fetched,
            verified = summary.verified,
            promoted = summary.promoted,
            demoted = summary.demoted,
            remote_deleted = summary.remote_deleted,
            deferred = summary.deferred,
            skipped = summary.skipped,
            exhausted = summary.exhausted,
            orphaned = summary.orphaned,
            errors = summary.errors,
            "outbox batch complete"
        );

        Ok(summary)
    }

    async fn process_event(&self, event: &OutboxEvent) -> Result<Outcome, AttachmentError> {
        match &event.payload {
            EventPayload::VerifyUpload {
                organization_id,
                object_id,
            } => self.verify_upload(event, *organization_id, object_id).await,
            EventPayload::RetryUpload {
                organization_id, ..
            } => self.retry_upload(event, *organization_id).await,
            EventPayload::DeleteRemote { object_id, .. } => {
                self.delete_remote(event, object_id).await
            }
        }
    }

    /// Confirm an upload reached the remote store; demote the attachment if
    /// the object has gone missing.
    async fn verify_upload(
        &self,
        event: &OutboxEvent,
        organization_id: Uuid,
        object_id: &str,
    ) -> Result<Outcome, AttachmentError> {
        let Some(attachment) = self
            .store
            .find_by_id(event.attachment_id, organization_id)
            .await?
        else {
            self.store.mark_processed(event.id, Utc::now()).await?;
            return Ok(Outcome::Skipped);
        };

        if attachment.status != AttachmentStatus::Active {
            // Another actor moved the attachment first; nothing to verify.
            self.store.mark_processed(event.id, Utc::now()).await?;
            return Ok(Outcome::Skipped);
        }

        match self.blob.exists(object_id).await {
            Ok(true) => {
                self.store
                    .set_last_verified(attachment.id, Utc::now())
                    .await?;
                self.store.mark_processed(event.id, Utc::now()).await?;
                Ok(Outcome::Verified)
            }
            Ok(false) => {
                let demoted_to = if attachment.backup_available {
                    AttachmentStatus::PendingUpload
                } else {
                    AttachmentStatus::Failed
                };

                let applied = self
                    .store
                    .transition_status(attachment.id, AttachmentStatus::Active, demoted_to)
                    .await?;

                if applied {
                    warn!(
                        attachment_id = %attachment.id,
                        organization_id = %organization_id,
                        status = %demoted_to,
                        "remote object missing, attachment demoted"
                    );
                    if demoted_to == AttachmentStatus::PendingUpload {
                        self.store
                            .enqueue(NewOutboxEvent::new(
                                attachment.id,
                                EventPayload::RetryUpload {
                                    organization_id,
                                    owner_type: attachment.owner_type.clone(),
                                    owner_id: attachment.owner_id,
                                },
                            ))
                            .await?;
                    }
                }

                self.store.mark_processed(event.id, Utc::now()).await?;
                Ok(if applied {
                    Outcome::Demoted
                } else {
                    Outcome::Skipped
                })
            }
            Err(e) => self.defer(event, &e).await,
        }
    }

    /// Re-attempt the remote upload from the stored backup.
    async fn retry_upload(
        &self,
        event: &OutboxEvent,
        organization_id: Uuid,
    ) -> Result<Outcome, AttachmentError> {
        let Some(attachment) = self
            .store
            .find_by_id(event.attachment_id, organization_id)
            .await?
        else {
            self.store.mark_processed(event.id, Utc::now()).await?;
            return Ok(Outcome::Skipped);
        };

        // Retry against failed or deleted attachments is a silent no-op.
        if attachment.status != AttachmentStatus::PendingUpload {
            self.store.mark_processed(event.id, Utc::now()).await?;
            return Ok(Outcome::Skipped);
        }

        let Some(backup) = self
            .store
            .fetch_backup(attachment.id, organization_id)
            .await?
        else {
            // Pending without a backup cannot make progress.
            self.store
                .transition_status(
                    attachment.id,
                    AttachmentStatus::PendingUpload,
                    AttachmentStatus::Failed,
                )
                .await?;
            self.store.mark_processed(event.id, Utc::now()).await?;
            return Ok(Outcome::Exhausted);
        };

        let key = build_object_key(
            attachment.organization_id,
            &attachment.owner_type,
            attachment.owner_id,
            attachment.id,
            &attachment.file_name,
        );

        match self.blob.put(&key, Bytes::from(backup.bytes)).await {
            Ok(stored) => {
                let applied = self
                    .store
                    .promote_to_active(attachment.id, &stored.url, &stored.object_id)
                    .await?;
                self.store.mark_processed(event.id, Utc::now()).await?;
                Ok(if applied {
                    info!(
                        attachment_id = %attachment.id,
                        organization_id = %organization_id,
                        "attachment promoted to active"
                    );
                    Outcome::Promoted
                } else {
                    Outcome::Skipped
                })
            }
            Err(e) => {
                let attempts = event.attempts + 1;
                if attempts >= self.config.max_attempts {
                    let exhausted = AttachmentError::RetryExhausted {
                        id: attachment.id,
                        attempts,
                    };
                    warn!(
                        attachment_id = %attachment.id,
                        organization_id = %organization_id,
                        error = %exhausted,
                        "giving up on retry upload, attachment failed"
                    );
                    self.store
                        .transition_status(
                            attachment.id,
                            AttachmentStatus::PendingUpload,
                            AttachmentStatus::Failed,
                        )
                        .await?;
                    self.store
                        .record_failure(event.id, &e.to_string(), Utc::now())
                        .await?;
                    self.store.mark_processed(event.id, Utc::now()).await?;
                    Ok(Outcome::Exhausted)
                } else {
                    self.store
                        .record_failure(
                            event.id,
                            &e.to_string(),
                            Utc::now() + self.backoff(event.attempts),
                        )
                        .await?;
                    Ok(Outcome::Deferred)
                }
            }
        }
    }

    /// Remove a remote object after a local soft-delete.
    async fn delete_remote(
        &self,
        event: &OutboxEvent,
        object_id: &str,
    ) -> Result<Outcome, AttachmentError> {
        match self.blob.delete(object_id).await {
            Ok(()) | Err(BlobError::NotFound { .. }) => {
                // Already-absent objects count as deleted.
                self.store.mark_processed(event.id, Utc::now()).await?;
                Ok(Outcome::RemoteDeleted)
            }
            Err(e) => {
                let attempts = event.attempts + 1;
                if attempts >= self.config.max_attempts {
                    // Left outstanding for manual cleanup; the attempt
                    // ceiling keeps it out of future batches.
                    warn!(
                        event_id = %event.id,
                        object_id,
                        attempts,
                        "remote delete exhausted, object orphaned"
                    );
                    self.store
                        .record_failure(event.id, &e.to_string(), Utc::now())
                        .await?;
                    Ok(Outcome::Orphaned)
                } else {
                    self.store
                        .record_failure(
                            event.id,
                            &e.to_string(),
                            Utc::now() + self.backoff(event.attempts),
                        )
                        .await?;
                    Ok(Outcome::Deferred)
                }
            }
        }
    }

    /// Defer a transiently-failing event to its next backoff slot.
    async fn defer(&self, event: &OutboxEvent, error: &BlobError) -> Result<Outcome, AttachmentError> {
        self.store
            .record_failure(
                event.id,
                &error.to_string(),
                Utc::now() + self.backoff(event.attempts),
            )
            .await?;
        Ok(Outcome::Deferred)
    }

    /// Capped exponential backoff: `min(base * 2^attempts, cap)`.
    fn backoff(&self, attempts: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempts);
        let secs = self
            .config
            .backoff_base_secs
            .saturating_mul(exp)
            .min(self.config.backoff_cap_secs);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::testing::{MockBlobStore, MockStore};
    use crate::attachment::{
        AttachmentConfig, AttachmentManager, UploadInput,
    };
    use crate::outbox::EventType;
    use crate::preview::{PreviewConfig, PreviewGenerator};

    fn manager(
        store: Arc<MockStore>,
        blob: Arc<MockBlobStore>,
    ) -> AttachmentManager<MockStore, MockBlobStore> {
        AttachmentManager::new(
            store,
            blob,
            PreviewGenerator::new(PreviewConfig::default()),
            AttachmentConfig::default(),
        )
    }

    fn processor(
        store: Arc<MockStore>,
        blob: Arc<MockBlobStore>,
        config: ProcessorConfig,
    ) -> OutboxProcessor<MockStore, MockBlobStore> {
        OutboxProcessor::new(store, blob, config)
    }

    /// Zero backoff so deferred events are immediately due again.
    fn fast_config() -> ProcessorConfig {
        ProcessorConfig::default().with_backoff_base_secs(0)
    }

    fn upload_input(org: Uuid, mime: &str, data: &str) -> UploadInput {
        UploadInput {
            organization_id: org,
            owner_type: "task".to_string(),
            owner_id: Uuid::new_v4(),
            file_name: "report.txt".to_string(),
            mime_type: mime.to_string(),
            data: bytes::Bytes::copy_from_slice(data.as_bytes()),
            uploaded_by: None,
        }
    }

    #[tokio::test]
    async fn test_verify_confirms_upload() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob, fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "verified content"))
            .await
            .expect("upload should succeed");

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.verified, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert!(stored.last_verified_at.is_some());
        assert!(store.events().iter().all(|e| e.processed_at.is_some()));
    }

    #[tokio::test]
    async fn test_verify_missing_object_demotes_and_reenqueues_retry() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "drifting content"))
            .await
            .expect("upload should succeed");
        let object_id = store
            .attachment(outcome.attachment_id)
            .and_then(|a| a.remote_object_id)
            .expect("remote object id recorded");

        // The remote object disappears out-of-band.
        blob.remove_object(&object_id);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.demoted, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::PendingUpload);

        let retries: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.payload.event_type() == EventType::RetryUpload)
            .collect();
        assert_eq!(retries.len(), 1);
        assert!(retries[0].processed_at.is_none());
    }

    #[tokio::test]
    async fn test_verify_missing_object_without_backup_fails() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        // Garbage claiming to be an image: remote put succeeds, strict
        // preview generation yields nothing.
        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "image/png", "not really a png"))
            .await
            .expect("upload should succeed");
        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Active);
        assert!(!stored.backup_available);

        blob.remove_object(stored.remote_object_id.as_deref().expect("object id"));

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.demoted, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Failed);
        // No retry can help without a backup.
        assert!(
            store
                .events()
                .iter()
                .all(|e| e.payload.event_type() != EventType::RetryUpload)
        );
    }

    #[tokio::test]
    async fn test_retry_promotes_when_remote_recovers() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        blob.fail_puts(true);
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "come back later"))
            .await
            .expect("upload should succeed");
        assert_eq!(outcome.status, AttachmentStatus::PendingUpload);

        blob.fail_puts(false);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.promoted, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Active);
        assert!(
            blob.contains(stored.remote_object_id.as_deref().expect("object id")),
            "remote store should hold the re-uploaded object"
        );
    }

    #[tokio::test]
    async fn test_retry_ceiling_transitions_to_failed_and_stops() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        blob.fail_puts(true);
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(
            store.clone(),
            blob.clone(),
            fast_config().with_max_attempts(3),
        );

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "never makes it"))
            .await
            .expect("upload should succeed");
        let puts_before = blob.put_count();

        // Attempts 1 and 2 defer, attempt 3 hits the ceiling.
        for _ in 0..2 {
            let summary = proc.run_batch(None, None).await.expect("batch should run");
            assert_eq!(summary.deferred, 1);
        }
        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.exhausted, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Failed);
        assert!(!stored.backup_available, "failed implies no usable backup");
        assert_eq!(blob.put_count() - puts_before, 3);

        // Nothing left to do: no further events, no further puts.
        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.fetched, 0);
        assert_eq!(blob.put_count() - puts_before, 3);
    }

    #[tokio::test]
    async fn test_duplicate_event_processing_is_idempotent() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "double delivery"))
            .await
            .expect("upload should succeed");
        let object_id = store
            .attachment(outcome.attachment_id)
            .and_then(|a| a.remote_object_id)
            .expect("object id");

        blob.remove_object(&object_id);
        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.demoted, 1);

        // A crash-redelivered duplicate of the same verify event, with the
        // remote store still down so the pending retry cannot interfere.
        store
            .enqueue(NewOutboxEvent::new(
                outcome.attachment_id,
                EventPayload::VerifyUpload {
                    organization_id: org,
                    object_id: object_id.clone(),
                },
            ))
            .await
            .expect("enqueue should succeed");
        blob.fail_puts(true);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        // Guard sees pending_upload, not active: silently discarded. The
        // legitimate retry event merely defers.
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.demoted, 0);
        assert_eq!(summary.deferred, 1);

        let retries: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.payload.event_type() == EventType::RetryUpload)
            .collect();
        assert_eq!(retries.len(), 1, "no second retry event enqueued");
    }

    #[tokio::test]
    async fn test_stale_transition_from_overlapping_run_is_refused() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "raced content"))
            .await
            .expect("upload should succeed");
        let object_id = store
            .attachment(outcome.attachment_id)
            .and_then(|a| a.remote_object_id)
            .expect("object id");
        blob.remove_object(&object_id);

        // An overlapping processor run demotes the row first.
        let applied = store
            .transition_status(
                outcome.attachment_id,
                AttachmentStatus::Active,
                AttachmentStatus::PendingUpload,
            )
            .await
            .expect("transition should succeed");
        assert!(applied);

        // The same compare-and-set from the stale run affects zero rows.
        let applied_again = store
            .transition_status(
                outcome.attachment_id,
                AttachmentStatus::Active,
                AttachmentStatus::PendingUpload,
            )
            .await
            .expect("transition should succeed");
        assert!(!applied_again);

        // And this run's verify event degrades to a silent no-op: no
        // demotion, no extra retry event.
        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.demoted, 0);
        assert!(
            store
                .events()
                .iter()
                .all(|e| e.payload.event_type() != EventType::RetryUpload)
        );
    }

    #[tokio::test]
    async fn test_retry_against_deleted_attachment_is_noop() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        blob.fail_puts(true);
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "deleted before retry"))
            .await
            .expect("upload should succeed");

        mgr.delete(outcome.attachment_id, org)
            .await
            .expect("delete should succeed");

        blob.fail_puts(false);
        let puts_before = blob.put_count();
        let summary = proc.run_batch(None, None).await.expect("batch should run");

        // The pending retry event is discarded; the delete had no remote
        // object so no cleanup event exists either.
        assert_eq!(summary.skipped, 1);
        assert_eq!(blob.put_count(), puts_before);
        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Deleted);
    }

    #[tokio::test]
    async fn test_delete_remote_removes_object() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "cleanup me"))
            .await
            .expect("upload should succeed");
        let object_id = store
            .attachment(outcome.attachment_id)
            .and_then(|a| a.remote_object_id)
            .expect("object id");

        mgr.delete(outcome.attachment_id, org)
            .await
            .expect("delete should succeed");
        assert!(blob.contains(&object_id), "remote delete is asynchronous");

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        // The verify event is skipped (status deleted), the cleanup runs.
        assert_eq!(summary.remote_deleted, 1);
        assert!(!blob.contains(&object_id));
        assert!(store.events().iter().all(|e| e.processed_at.is_some()));
    }

    #[tokio::test]
    async fn test_delete_remote_already_absent_is_success() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "gone already"))
            .await
            .expect("upload should succeed");
        let object_id = store
            .attachment(outcome.attachment_id)
            .and_then(|a| a.remote_object_id)
            .expect("object id");

        mgr.delete(outcome.attachment_id, org)
            .await
            .expect("delete should succeed");
        blob.remove_object(&object_id);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.remote_deleted, 1);
    }

    #[tokio::test]
    async fn test_delete_remote_orphaned_after_ceiling() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(
            store.clone(),
            blob.clone(),
            fast_config().with_max_attempts(2),
        );

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "stuck remote"))
            .await
            .expect("upload should succeed");
        mgr.delete(outcome.attachment_id, org)
            .await
            .expect("delete should succeed");

        blob.fail_ops(true);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        // The stale verify event skips; the delete defers.
        assert_eq!(summary.deferred, 1);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.orphaned, 1);

        // Orphaned events stay outstanding but never come back.
        let outstanding: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.processed_at.is_none())
            .collect();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].attempts, 2);

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.fetched, 0);
    }

    #[tokio::test]
    async fn test_transient_verify_failure_defers_without_demotion() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        let outcome = mgr
            .upload(upload_input(org, "text/plain", "slow remote"))
            .await
            .expect("upload should succeed");

        blob.fail_ops(true);
        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.deferred, 1);

        let stored = store.attachment(outcome.attachment_id).expect("row exists");
        assert_eq!(stored.status, AttachmentStatus::Active);

        let event = store.events().pop().expect("event exists");
        assert_eq!(event.attempts, 1);
        assert!(event.last_error.is_some());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_batch() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org = Uuid::new_v4();
        // One healthy active upload...
        mgr.upload(upload_input(org, "text/plain", "healthy"))
            .await
            .expect("upload should succeed");

        // ...and one pending upload whose retry keeps failing.
        blob.fail_puts(true);
        mgr.upload(upload_input(org, "text/plain", "unhealthy"))
            .await
            .expect("upload should succeed");

        let summary = proc.run_batch(None, None).await.expect("batch should run");
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.deferred, 1);
    }

    #[tokio::test]
    async fn test_batch_respects_limit_and_org_scope() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let mgr = manager(store.clone(), blob.clone());
        let proc = processor(store.clone(), blob.clone(), fast_config());

        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        for org in [org_a, org_a, org_b] {
            mgr.upload(upload_input(org, "text/plain", "scoped"))
                .await
                .expect("upload should succeed");
        }

        let summary = proc
            .run_batch(Some(1), None)
            .await
            .expect("batch should run");
        assert_eq!(summary.fetched, 1);

        let summary = proc
            .run_batch(None, Some(org_b))
            .await
            .expect("batch should run");
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.verified, 1);
    }

    #[test]
    fn test_backoff_is_capped_exponential() {
        let store = Arc::new(MockStore::new());
        let blob = Arc::new(MockBlobStore::new());
        let proc = processor(store, blob, ProcessorConfig::default());

        assert_eq!(proc.backoff(0), Duration::seconds(30));
        assert_eq!(proc.backoff(1), Duration::seconds(60));
        assert_eq!(proc.backoff(2), Duration::seconds(120));
        // Capped at one hour.
        assert_eq!(proc.backoff(10), Duration::seconds(3600));
        assert_eq!(proc.backoff(63), Duration::seconds(3600));
    }
}
