//! Repository implementations for data access.
//!
//! The single [`AttachmentRepository`] implements both core store traits
//! (`AttachmentStore` and `OutboxLog`), since attachment changes and their
//! outbox events must share transactions.

pub mod attachment;
pub mod outbox;

pub use attachment::AttachmentRepository;
