//! `SeaORM` entity definitions.

pub mod attachments;
pub mod outbox_events;
pub mod sea_orm_active_enums;
