//! Transactional outbox.
//!
//! Every aggregate write stores its pending domain events as
//! [`OutboxRecord`]s in the same storage transaction as the state change.
//! A separate [`OutboxRelay`] drains unpublished records to the message bus
//! (at-least-once) and stamps `published_at`.

pub mod record;
pub mod relay;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use record::OutboxRecord;
pub use relay::{EventPublisher, OutboxRelay, OutboxSource, PublishError, RelayBatch, RelayError};

/// An event produced by an aggregate mutation.
pub trait DomainEvent {
    /// Unique id of this occurrence; doubles as the outbox record id.
    fn event_id(&self) -> Uuid;

    /// Dotted event type, e.g. `ledger.entry.posted`.
    fn event_type(&self) -> &'static str;

    /// Kind of aggregate that emitted the event.
    fn aggregate_type(&self) -> &'static str;

    /// Id of the aggregate that emitted the event.
    fn aggregate_id(&self) -> Uuid;

    /// Owning tenant.
    fn tenant_id(&self) -> Uuid;

    /// When the change happened.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Event-specific body placed under `data` in the payload envelope.
    fn data(&self) -> serde_json::Value;
}

/// A versioned consistency boundary whose writes go through the outbox.
///
/// Stores insert the aggregate when [`Aggregate::expected_version`] is 0 and
/// otherwise update it only where the stored version still equals the
/// expected one.
pub trait Aggregate {
    /// Events this aggregate emits.
    type Event: DomainEvent;

    /// Aggregate id.
    fn aggregate_id(&self) -> Uuid;

    /// Current in-memory version.
    fn version(&self) -> i64;

    /// Version the stored row must still have for this write to apply.
    fn expected_version(&self) -> i64;

    /// Events recorded since the last successful commit.
    fn pending_events(&self) -> &[Self::Event];

    /// Clears pending events after the store committed them.
    fn mark_committed(&mut self);
}
