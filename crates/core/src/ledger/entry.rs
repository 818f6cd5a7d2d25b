//! The journal entry aggregate.
//!
//! A journal entry is created once in status POSTED and may later move to
//! REVERSED when an offsetting entry is created. It is never deleted.
//! Every mutation bumps `version`; stores persist it with a compare-and-swap
//! on the version they last saw.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use ledger_shared::types::{JournalEntryId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{LedgerError, ValidationError};
use super::events::LedgerEvent;
use super::fiscal::{FiscalPeriod, PeriodStatus, ensure_open};
use super::posting::PostingPair;
use super::validation::validate_all;
use crate::outbox::Aggregate;

/// Lifecycle state of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    /// Live entry affecting balances.
    Posted,
    /// Offset by a reversing entry.
    Reversed,
}

impl EntryStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POSTED" => Ok(Self::Posted),
            "REVERSED" => Ok(Self::Reversed),
            other => Err(LedgerError::Storage(format!(
                "unknown journal entry status {other:?}"
            ))),
        }
    }
}

/// Input for posting a new journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Accounting date.
    pub effective_date: NaiveDate,
    /// Posting pairs, in order.
    pub postings: Vec<PostingPair>,
    /// Entry description.
    pub description: String,
    /// External reference (e.g. payment id); used for reconciliation.
    pub reference: String,
}

/// Persisted form of a journal entry, used by stores to rebuild the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntryRecord {
    /// Entry id.
    pub id: JournalEntryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Accounting date.
    pub effective_date: NaiveDate,
    /// Posting pairs, in order.
    pub postings: Vec<PostingPair>,
    /// Lifecycle state.
    pub status: EntryStatus,
    /// Entry description.
    pub description: String,
    /// External reference.
    pub reference: String,
    /// Stored version.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Entry this one reverses.
    pub reversal_of: Option<JournalEntryId>,
    /// Entry that reversed this one.
    pub reversed_by: Option<JournalEntryId>,
}

/// A balanced, versioned unit of ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    id: JournalEntryId,
    tenant_id: TenantId,
    effective_date: NaiveDate,
    postings: Vec<PostingPair>,
    status: EntryStatus,
    description: String,
    reference: String,
    version: i64,
    persisted_version: i64,
    persisted_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    reversal_of: Option<JournalEntryId>,
    reversed_by: Option<JournalEntryId>,
    pending_events: Vec<LedgerEvent>,
}

impl JournalEntry {
    /// Validates `new` and creates a POSTED entry at version 1 with a queued
    /// `EntryPosted` event.
    ///
    /// `period_status` is the status of the period containing
    /// `new.effective_date`.
    pub fn post(
        new: NewJournalEntry,
        now: DateTime<Utc>,
        period_status: PeriodStatus,
    ) -> Result<Self, LedgerError> {
        if new.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription.into());
        }
        validate_all(&new.postings)?;
        ensure_open(FiscalPeriod::from_date(new.effective_date)?, period_status)?;

        let id = JournalEntryId::new();
        Ok(Self {
            id,
            tenant_id: new.tenant_id,
            effective_date: new.effective_date,
            postings: new.postings,
            status: EntryStatus::Posted,
            description: new.description,
            reference: new.reference,
            version: 1,
            persisted_version: 0,
            persisted_date: None,
            created_at: now,
            updated_at: now,
            reversal_of: None,
            reversed_by: None,
            pending_events: vec![LedgerEvent::entry_posted(
                id,
                new.tenant_id,
                new.effective_date,
                now,
            )],
        })
    }

    /// Rebuilds an entry from storage. No validation, no events.
    #[must_use]
    pub fn rehydrate(record: JournalEntryRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            effective_date: record.effective_date,
            postings: record.postings,
            status: record.status,
            description: record.description,
            reference: record.reference,
            version: record.version,
            persisted_version: record.version,
            persisted_date: Some(record.effective_date),
            created_at: record.created_at,
            updated_at: record.updated_at,
            reversal_of: record.reversal_of,
            reversed_by: record.reversed_by,
            pending_events: Vec::new(),
        }
    }

    /// Snapshot for persistence.
    #[must_use]
    pub fn to_record(&self) -> JournalEntryRecord {
        JournalEntryRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            effective_date: self.effective_date,
            postings: self.postings.clone(),
            status: self.status,
            description: self.description.clone(),
            reference: self.reference.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            reversal_of: self.reversal_of,
            reversed_by: self.reversed_by,
        }
    }

    /// Reverses this entry.
    ///
    /// Returns the new offsetting entry (legs swapped, dated `now`, queued
    /// `EntryPosted`). This entry becomes REVERSED and queues
    /// `EntryReversed`. Both entries must then be saved together.
    ///
    /// `original_period` is the status of this entry's period,
    /// `reversal_period` the status of the period containing `now`.
    pub fn reverse(
        &mut self,
        now: DateTime<Utc>,
        reason: &str,
        original_period: PeriodStatus,
        reversal_period: PeriodStatus,
    ) -> Result<Self, LedgerError> {
        if self.status != EntryStatus::Posted {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                action: "reverse",
            });
        }
        ensure_open(self.period()?, original_period)?;

        let reversal_date = now.date_naive();
        ensure_open(FiscalPeriod::from_date(reversal_date)?, reversal_period)?;

        let reversal_id = JournalEntryId::new();
        let reversal = Self {
            id: reversal_id,
            tenant_id: self.tenant_id,
            effective_date: reversal_date,
            postings: self.postings.iter().map(PostingPair::reversed).collect(),
            status: EntryStatus::Posted,
            description: format!("Reversal of {}: {reason}", self.id),
            reference: self.id.to_string(),
            version: 1,
            persisted_version: 0,
            persisted_date: None,
            created_at: now,
            updated_at: now,
            reversal_of: Some(self.id),
            reversed_by: None,
            pending_events: vec![LedgerEvent::entry_posted(
                reversal_id,
                self.tenant_id,
                reversal_date,
                now,
            )],
        };

        self.status = EntryStatus::Reversed;
        self.reversed_by = Some(reversal_id);
        self.touch(now);
        self.pending_events.push(LedgerEvent::entry_reversed(
            self.id,
            reversal_id,
            self.tenant_id,
            now,
        ));

        Ok(reversal)
    }

    /// Moves the effective date (back-valuation).
    ///
    /// Only POSTED entries may be re-dated, never into the future, and both
    /// the current and the target period must be OPEN.
    pub fn set_effective_date(
        &mut self,
        new_date: NaiveDate,
        now: DateTime<Utc>,
        current_period: PeriodStatus,
        target_period: PeriodStatus,
    ) -> Result<(), LedgerError> {
        if self.status != EntryStatus::Posted {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                action: "back-value",
            });
        }
        let today = now.date_naive();
        if new_date > today {
            return Err(LedgerError::FutureBackvalue {
                date: new_date,
                today,
            });
        }
        ensure_open(self.period()?, current_period)?;
        ensure_open(FiscalPeriod::from_date(new_date)?, target_period)?;

        self.effective_date = new_date;
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Fiscal period of the effective date.
    pub fn period(&self) -> Result<FiscalPeriod, ValidationError> {
        FiscalPeriod::from_date(self.effective_date)
    }

    /// Periods whose contents a save of this entry changes: the current
    /// period, plus the stored one when a back-valuation moved the entry.
    pub fn touched_periods(&self) -> Result<Vec<FiscalPeriod>, ValidationError> {
        let mut periods = vec![self.period()?];
        if let Some(stored) = self.persisted_date {
            let stored = FiscalPeriod::from_date(stored)?;
            if !periods.contains(&stored) {
                periods.push(stored);
            }
        }
        Ok(periods)
    }

    /// Entry id.
    #[must_use]
    pub const fn id(&self) -> JournalEntryId {
        self.id
    }

    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Accounting date.
    #[must_use]
    pub const fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    /// Posting pairs, in order.
    #[must_use]
    pub fn postings(&self) -> &[PostingPair] {
        &self.postings
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> EntryStatus {
        self.status
    }

    /// Description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// External reference.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Current version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Entry this one reverses, if it is a reversal.
    #[must_use]
    pub const fn reversal_of(&self) -> Option<JournalEntryId> {
        self.reversal_of
    }

    /// Entry that reversed this one.
    #[must_use]
    pub const fn reversed_by(&self) -> Option<JournalEntryId> {
        self.reversed_by
    }

    /// Returns true if this entry has never been stored.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.persisted_version == 0
    }
}

impl Aggregate for JournalEntry {
    type Event = LedgerEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id.into_inner()
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn expected_version(&self) -> i64 {
        self.persisted_version
    }

    fn pending_events(&self) -> &[LedgerEvent] {
        &self.pending_events
    }

    fn mark_committed(&mut self) {
        self.persisted_version = self.version;
        self.persisted_date = Some(self.effective_date);
        self.pending_events.clear();
    }
}
