//! Outbox event types.
//!
//! An outbox event is a durable follow-up action written in the same local
//! transaction as the attachment row it concerns, then drained asynchronously
//! by the processor. Events carry a snapshot of everything needed to act so
//! the processor never depends on mutable attachment fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outbox event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Confirm a completed upload actually reached the remote store.
    VerifyUpload,
    /// Re-attempt a remote upload from the stored backup.
    RetryUpload,
    /// Remove a remote object after a local soft-delete.
    DeleteRemote,
}

impl EventType {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyUpload => "verify_upload",
            Self::RetryUpload => "retry_upload",
            Self::DeleteRemote => "delete_remote",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "verify_upload" => Some(Self::VerifyUpload),
            "retry_upload" => Some(Self::RetryUpload),
            "delete_remote" => Some(Self::DeleteRemote),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed event payload, one schema per event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Snapshot for a verify-upload action.
    VerifyUpload {
        /// Organization scope.
        organization_id: Uuid,
        /// Remote object to check.
        object_id: String,
    },
    /// Snapshot for a retry-upload action.
    RetryUpload {
        /// Organization scope.
        organization_id: Uuid,
        /// Kind of the owning business entity.
        owner_type: String,
        /// ID of the owning business entity.
        owner_id: Uuid,
    },
    /// Snapshot for a delete-remote action.
    DeleteRemote {
        /// Organization scope.
        organization_id: Uuid,
        /// Remote object to remove.
        object_id: String,
    },
}

impl EventPayload {
    /// The event type this payload belongs to.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::VerifyUpload { .. } => EventType::VerifyUpload,
            Self::RetryUpload { .. } => EventType::RetryUpload,
            Self::DeleteRemote { .. } => EventType::DeleteRemote,
        }
    }

    /// The organization scope of the event.
    #[must_use]
    pub fn organization_id(&self) -> Uuid {
        match self {
            Self::VerifyUpload {
                organization_id, ..
            }
            | Self::RetryUpload {
                organization_id, ..
            }
            | Self::DeleteRemote {
                organization_id, ..
            } => *organization_id,
        }
    }
}

/// A new event to append to the outbox log.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    /// Event ID.
    pub id: Uuid,
    /// Attachment the event concerns.
    pub attachment_id: Uuid,
    /// Typed action snapshot.
    pub payload: EventPayload,
}

impl NewOutboxEvent {
    /// Create a new event for an attachment.
    #[must_use]
    pub fn new(attachment_id: Uuid, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            attachment_id,
            payload,
        }
    }

    /// The organization scope of the event.
    #[must_use]
    pub fn organization_id(&self) -> Uuid {
        self.payload.organization_id()
    }
}

/// A durable outbox event as read back from the log.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    /// Event ID.
    pub id: Uuid,
    /// Attachment the event concerns.
    pub attachment_id: Uuid,
    /// Organization scope (denormalized for batch filtering).
    pub organization_id: Uuid,
    /// Typed action snapshot.
    pub payload: EventPayload,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    /// Completion timestamp; `None` while outstanding.
    pub processed_at: Option<DateTime<Utc>>,
}
