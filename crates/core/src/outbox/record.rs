//! Outbox rows.

use chrono::{DateTime, Utc};
use ledger_shared::types::OutboxRecordId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Aggregate, DomainEvent};

/// One pending or relayed domain event.
///
/// Append-only: the only mutation after insert is stamping `published_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Record id, equal to the event id.
    pub id: OutboxRecordId,
    /// Aggregate that emitted the event.
    pub aggregate_id: Uuid,
    /// Aggregate kind, e.g. `JournalEntry`.
    pub aggregate_type: String,
    /// Event type, e.g. `ledger.entry.posted`.
    pub event_type: String,
    /// Serialized event envelope.
    pub payload: serde_json::Value,
    /// Insertion time; relay order.
    pub created_at: DateTime<Utc>,
    /// Set once the relay handed the record to the bus.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Wraps an event in the standard envelope:
    /// `{event_id, event_type, aggregate_id, aggregate_type, tenant_id, occurred_at, data}`.
    pub fn from_event<E: DomainEvent + ?Sized>(event: &E) -> Self {
        let payload = serde_json::json!({
            "event_id": event.event_id(),
            "event_type": event.event_type(),
            "aggregate_id": event.aggregate_id(),
            "aggregate_type": event.aggregate_type(),
            "tenant_id": event.tenant_id(),
            "occurred_at": event.occurred_at(),
            "data": event.data(),
        });

        Self {
            id: OutboxRecordId::from_uuid(event.event_id()),
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_string(),
            event_type: event.event_type().to_string(),
            payload,
            created_at: event.occurred_at(),
            published_at: None,
        }
    }

    /// One record per pending event of `aggregate`, in emission order.
    pub fn for_aggregate<A: Aggregate>(aggregate: &A) -> Vec<Self> {
        aggregate
            .pending_events()
            .iter()
            .map(Self::from_event)
            .collect()
    }

    /// Returns true until the relay stamps the record.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.published_at.is_none()
    }
}
