//! Durable outbox log and its asynchronous batch processor.
//!
//! Follow-up actions against the remote store (verify, retry, delete) are
//! appended in the same local transaction as the attachment change that
//! needs them, then drained later by [`OutboxProcessor`]. This is what makes
//! the dual-write converge: the local transaction is the source of truth and
//! the remote store is reconciled to it over time.

mod processor;
mod types;

pub use processor::{BatchSummary, OutboxLog, OutboxProcessor, ProcessorConfig};
pub use types::{EventPayload, EventType, NewOutboxEvent, OutboxEvent};
