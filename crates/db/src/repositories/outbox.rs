//! Outbox table access: inserts inside a caller's transaction, and the
//! relay's read/acknowledge side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::outbox::{OutboxRecord, OutboxSource, RelayError};
use ledger_shared::types::OutboxRecordId;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, sea_query::Expr,
};
use tracing::debug;

use super::utc;
use crate::entities::outbox_events;

/// Inserts `records` through `conn`, normally an open transaction that also
/// carries the state change the records describe.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub async fn insert_records<C: ConnectionTrait>(
    conn: &C,
    records: &[OutboxRecord],
) -> Result<(), DbErr> {
    if records.is_empty() {
        return Ok(());
    }

    let models = records.iter().map(|record| outbox_events::ActiveModel {
        id: Set(record.id.into_inner()),
        aggregate_id: Set(record.aggregate_id),
        aggregate_type: Set(record.aggregate_type.clone()),
        event_type: Set(record.event_type.clone()),
        payload: Set(record.payload.clone()),
        created_at: Set(record.created_at.into()),
        published_at: Set(record.published_at.map(Into::into)),
    });
    outbox_events::Entity::insert_many(models).exec(conn).await?;
    Ok(())
}

impl From<outbox_events::Model> for OutboxRecord {
    fn from(model: outbox_events::Model) -> Self {
        Self {
            id: OutboxRecordId::from_uuid(model.id),
            aggregate_id: model.aggregate_id,
            aggregate_type: model.aggregate_type,
            event_type: model.event_type,
            payload: model.payload,
            created_at: utc(model.created_at),
            published_at: model.published_at.map(utc),
        }
    }
}

/// Outbox repository used by the relay.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    db: DatabaseConnection,
}

impl OutboxRepository {
    /// Creates a new outbox repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// All records of one aggregate, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn records_for_aggregate(
        &self,
        aggregate_id: uuid::Uuid,
    ) -> Result<Vec<OutboxRecord>, DbErr> {
        let rows = outbox_events::Entity::find()
            .filter(outbox_events::Column::AggregateId.eq(aggregate_id))
            .order_by_asc(outbox_events::Column::CreatedAt)
            .order_by_asc(outbox_events::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }
}

#[async_trait]
impl OutboxSource for OutboxRepository {
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxRecord>, RelayError> {
        let rows = outbox_events::Entity::find()
            .filter(outbox_events::Column::PublishedAt.is_null())
            .order_by_asc(outbox_events::Column::CreatedAt)
            .order_by_asc(outbox_events::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn mark_published(
        &self,
        ids: &[OutboxRecordId],
        published_at: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = outbox_events::Entity::update_many()
            .col_expr(outbox_events::Column::PublishedAt, Expr::value(published_at))
            .filter(outbox_events::Column::Id.is_in(ids.iter().map(|id| id.into_inner())))
            .filter(outbox_events::Column::PublishedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        debug!(stamped = result.rows_affected, "outbox records marked published");
        Ok(())
    }
}
