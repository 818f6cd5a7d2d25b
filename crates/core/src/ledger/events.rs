//! Ledger domain events.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_shared::types::{EventId, JournalEntryId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fiscal::FiscalPeriod;
use crate::outbox::DomainEvent;

/// Aggregate type of journal entries in outbox rows.
pub const JOURNAL_ENTRY_AGGREGATE: &str = "JournalEntry";
/// Aggregate type of fiscal periods in outbox rows.
pub const FISCAL_PERIOD_AGGREGATE: &str = "FiscalPeriod";

/// Fields every ledger event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id.
    pub event_id: EventId,
    /// Emitting aggregate.
    pub aggregate_id: Uuid,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    fn new(aggregate_id: Uuid, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id,
            tenant_id,
            occurred_at,
        }
    }
}

/// Events emitted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A journal entry was posted.
    EntryPosted {
        /// Common event fields.
        #[serde(flatten)]
        meta: EventMetadata,
        /// The new entry.
        entry_id: JournalEntryId,
        /// Its effective date.
        effective_date: NaiveDate,
    },
    /// A journal entry was reversed by a new offsetting entry.
    EntryReversed {
        /// Common event fields.
        #[serde(flatten)]
        meta: EventMetadata,
        /// The reversed entry.
        entry_id: JournalEntryId,
        /// The offsetting entry.
        reversal_entry_id: JournalEntryId,
    },
    /// A fiscal period was closed.
    PeriodClosed {
        /// Common event fields.
        #[serde(flatten)]
        meta: EventMetadata,
        /// The closed period.
        period: FiscalPeriod,
    },
}

impl LedgerEvent {
    /// `ledger.entry.posted`
    #[must_use]
    pub fn entry_posted(
        entry_id: JournalEntryId,
        tenant_id: TenantId,
        effective_date: NaiveDate,
        at: DateTime<Utc>,
    ) -> Self {
        Self::EntryPosted {
            meta: EventMetadata::new(entry_id.into_inner(), tenant_id, at),
            entry_id,
            effective_date,
        }
    }

    /// `ledger.entry.reversed`
    #[must_use]
    pub fn entry_reversed(
        entry_id: JournalEntryId,
        reversal_entry_id: JournalEntryId,
        tenant_id: TenantId,
        at: DateTime<Utc>,
    ) -> Self {
        Self::EntryReversed {
            meta: EventMetadata::new(entry_id.into_inner(), tenant_id, at),
            entry_id,
            reversal_entry_id,
        }
    }

    /// `ledger.period.closed`; `period_id` is the stored fiscal period row.
    #[must_use]
    pub fn period_closed(
        period_id: Uuid,
        tenant_id: TenantId,
        period: FiscalPeriod,
        at: DateTime<Utc>,
    ) -> Self {
        Self::PeriodClosed {
            meta: EventMetadata::new(period_id, tenant_id, at),
            period,
        }
    }

    /// Common event fields.
    #[must_use]
    pub const fn meta(&self) -> &EventMetadata {
        match self {
            Self::EntryPosted { meta, .. }
            | Self::EntryReversed { meta, .. }
            | Self::PeriodClosed { meta, .. } => meta,
        }
    }
}

impl DomainEvent for LedgerEvent {
    fn event_id(&self) -> Uuid {
        self.meta().event_id.into_inner()
    }

    fn event_type(&self) -> &'static str {
        match self {
            Self::EntryPosted { .. } => "ledger.entry.posted",
            Self::EntryReversed { .. } => "ledger.entry.reversed",
            Self::PeriodClosed { .. } => "ledger.period.closed",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        match self {
            Self::EntryPosted { .. } | Self::EntryReversed { .. } => JOURNAL_ENTRY_AGGREGATE,
            Self::PeriodClosed { .. } => FISCAL_PERIOD_AGGREGATE,
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.meta().aggregate_id
    }

    fn tenant_id(&self) -> Uuid {
        self.meta().tenant_id.into_inner()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.meta().occurred_at
    }

    fn data(&self) -> serde_json::Value {
        match self {
            Self::EntryPosted {
                entry_id,
                effective_date,
                ..
            } => serde_json::json!({
                "entry_id": entry_id,
                "effective_date": effective_date,
            }),
            Self::EntryReversed {
                entry_id,
                reversal_entry_id,
                ..
            } => serde_json::json!({
                "entry_id": entry_id,
                "reversal_entry_id": reversal_entry_id,
            }),
            Self::PeriodClosed { period, .. } => serde_json::json!({ "period": period }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::outbox::OutboxRecord;

    #[test]
    fn test_posted_envelope() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        let entry_id = JournalEntryId::new();
        let tenant_id = TenantId::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let event = LedgerEvent::entry_posted(entry_id, tenant_id, date, at);

        let record = OutboxRecord::from_event(&event);

        assert_eq!(record.id.into_inner(), event.event_id());
        assert_eq!(record.aggregate_id, entry_id.into_inner());
        assert_eq!(record.aggregate_type, "JournalEntry");
        assert_eq!(record.event_type, "ledger.entry.posted");
        assert_eq!(record.created_at, at);
        assert!(record.is_pending());

        let payload = &record.payload;
        assert_eq!(payload["event_type"], "ledger.entry.posted");
        assert_eq!(payload["tenant_id"], tenant_id.to_string());
        assert_eq!(payload["aggregate_type"], "JournalEntry");
        assert_eq!(payload["data"]["entry_id"], entry_id.to_string());
        assert_eq!(payload["data"]["effective_date"], "2024-01-15");
    }

    #[test]
    fn test_period_closed_envelope() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let period = FiscalPeriod::new(2024, 1).unwrap();
        let event = LedgerEvent::period_closed(Uuid::now_v7(), TenantId::new(), period, at);

        assert_eq!(event.event_type(), "ledger.period.closed");
        assert_eq!(event.aggregate_type(), "FiscalPeriod");
        assert_eq!(event.data(), serde_json::json!({ "period": "2024-01" }));
    }

    #[test]
    fn test_reversed_event_targets_original() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let original = JournalEntryId::new();
        let reversal = JournalEntryId::new();
        let event = LedgerEvent::entry_reversed(original, reversal, TenantId::new(), at);

        assert_eq!(event.aggregate_id(), original.into_inner());
        assert_eq!(event.data()["reversal_entry_id"], reversal.to_string());
    }
}
