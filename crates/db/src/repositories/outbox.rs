//! Outbox log repository operations.
//!
//! Implements the core `OutboxLog` trait on [`AttachmentRepository`] so the
//! log shares transactions with attachment writes.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::error;
use uuid::Uuid;

use super::attachment::AttachmentRepository;
use crate::entities::{outbox_events, sea_orm_active_enums::OutboxEventType as DbEventType};
use worklane_core::attachment::AttachmentError;
use worklane_core::outbox::{EventPayload, EventType, NewOutboxEvent, OutboxEvent, OutboxLog};

/// Build the active model for a new event; shared with the transactional
/// attachment writes.
pub(crate) fn new_event_model(
    event: &NewOutboxEvent,
) -> Result<outbox_events::ActiveModel, AttachmentError> {
    let payload = serde_json::to_value(&event.payload)
        .map_err(|e| AttachmentError::repository(e.to_string()))?;

    Ok(outbox_events::ActiveModel {
        id: Set(event.id),
        attachment_id: Set(event.attachment_id),
        organization_id: Set(event.organization_id()),
        event_type: Set(to_db_event_type(event.payload.event_type())),
        payload: Set(payload),
        attempts: Set(0),
        last_error: Set(None),
        created_at: Set(Utc::now().into()),
        next_attempt_at: Set(Utc::now().into()),
        processed_at: Set(None),
    })
}

impl OutboxLog for AttachmentRepository {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<(), AttachmentError> {
        new_event_model(&event)?
            .insert(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;
        Ok(())
    }

    async fn fetch_due(
        &self,
        limit: u64,
        organization_id: Option<Uuid>,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<OutboxEvent>, AttachmentError> {
        let mut query = outbox_events::Entity::find()
            .filter(outbox_events::Column::ProcessedAt.is_null())
            .filter(
                outbox_events::Column::Attempts.lt(i32::try_from(max_attempts).unwrap_or(i32::MAX)),
            )
            .filter(outbox_events::Column::NextAttemptAt.lte(now))
            .order_by_asc(outbox_events::Column::NextAttemptAt)
            .limit(limit);

        if let Some(org) = organization_id {
            query = query.filter(outbox_events::Column::OrganizationId.eq(org));
        }

        let models = query
            .all(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        let mut events = Vec::with_capacity(models.len());
        for model in models {
            match serde_json::from_value::<EventPayload>(model.payload.clone()) {
                Ok(payload) => events.push(to_domain_event(model, payload)),
                Err(e) => {
                    // A payload that no longer decodes can never be acted
                    // on; park it so it does not wedge every batch.
                    error!(
                        event_id = %model.id,
                        attachment_id = %model.attachment_id,
                        error = %e,
                        "undecodable outbox payload, marking processed"
                    );
                    self.park_poison_event(model.id, &e.to_string()).await?;
                }
            }
        }

        Ok(events)
    }

    async fn mark_processed(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        let update = outbox_events::ActiveModel {
            processed_at: Set(Some(at.into())),
            ..Default::default()
        };

        outbox_events::Entity::update_many()
            .set(update)
            .filter(outbox_events::Column::Id.eq(event_id))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(())
    }

    async fn record_failure(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), AttachmentError> {
        outbox_events::Entity::update_many()
            .col_expr(
                outbox_events::Column::Attempts,
                Expr::col(outbox_events::Column::Attempts).add(1),
            )
            .col_expr(outbox_events::Column::LastError, Expr::value(error))
            .col_expr(
                outbox_events::Column::NextAttemptAt,
                Expr::value(next_attempt_at),
            )
            .filter(outbox_events::Column::Id.eq(event_id))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(())
    }
}

impl AttachmentRepository {
    /// Mark an undecodable event processed with the decode error recorded.
    async fn park_poison_event(&self, event_id: Uuid, error: &str) -> Result<(), AttachmentError> {
        let update = outbox_events::ActiveModel {
            last_error: Set(Some(format!("undecodable payload: {error}"))),
            processed_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };

        outbox_events::Entity::update_many()
            .set(update)
            .filter(outbox_events::Column::Id.eq(event_id))
            .exec(&self.db)
            .await
            .map_err(|e| AttachmentError::repository(e.to_string()))?;

        Ok(())
    }
}

/// Convert domain event type to database enum.
fn to_db_event_type(event_type: EventType) -> DbEventType {
    match event_type {
        EventType::VerifyUpload => DbEventType::VerifyUpload,
        EventType::RetryUpload => DbEventType::RetryUpload,
        EventType::DeleteRemote => DbEventType::DeleteRemote,
    }
}

/// Convert database model to domain event.
fn to_domain_event(model: outbox_events::Model, payload: EventPayload) -> OutboxEvent {
    OutboxEvent {
        id: model.id,
        attachment_id: model.attachment_id,
        organization_id: model.organization_id,
        payload,
        attempts: u32::try_from(model.attempts).unwrap_or(0),
        last_error: model.last_error,
        created_at: model.created_at.with_timezone(&Utc),
        next_attempt_at: model.next_attempt_at.with_timezone(&Utc),
        processed_at: model.processed_at.map(|t| t.with_timezone(&Utc)),
    }
}
