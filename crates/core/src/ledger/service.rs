//! Ledger service: orchestrates validation, the fiscal gate and atomic
//! persistence for every ledger write.
//!
//! Each write loads what it needs, applies the aggregate transition and
//! hands all touched aggregates to one `save` call. Conflicts surface as
//! [`LedgerError::OptimisticLock`]; retrying is up to the caller (see
//! [`super::retry_on_conflict`]).

use std::sync::Arc;

use chrono::NaiveDate;
use ledger_shared::types::{CurrencyCode, JournalEntryId, TenantId};
use tracing::{info, instrument};

use super::account::AccountCode;
use super::balance::AccountBalance;
use super::entry::{JournalEntry, NewJournalEntry};
use super::error::LedgerError;
use super::fiscal::{FiscalPeriod, PeriodStatus};
use super::ports::LedgerStore;
use crate::clock::{Clock, SystemClock};
use crate::nostro::{InternalLedgerEntry, internal_entries};
use crate::outbox::Aggregate;

/// Both sides of a reversal.
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    /// The original entry, now REVERSED.
    pub original: JournalEntry,
    /// The new offsetting entry.
    pub reversal: JournalEntry,
}

/// Ledger application service.
pub struct LedgerService<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Creates a service using the wall clock.
    pub const fn with_system_clock(store: Arc<S>) -> Self {
        Self {
            store,
            clock: SystemClock,
        }
    }
}

impl<S, C> LedgerService<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    /// Creates a service.
    pub const fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validates and posts a new journal entry.
    ///
    /// The entry row, its balance deltas and its `ledger.entry.posted`
    /// outbox record commit together.
    #[instrument(skip_all, fields(tenant_id = %new.tenant_id, reference = %new.reference))]
    pub async fn post_entry(&self, new: NewJournalEntry) -> Result<JournalEntry, LedgerError> {
        let period = FiscalPeriod::from_date(new.effective_date)?;
        let status = self.store.period_status(new.tenant_id, period).await?;

        let mut entry = JournalEntry::post(new, self.clock.now(), status)?;
        self.store.save(&[&entry]).await?;
        let events = entry.pending_events().len();
        entry.mark_committed();

        info!(
            entry_id = %entry.id(),
            effective_date = %entry.effective_date(),
            postings = entry.postings().len(),
            events,
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Reverses a POSTED entry with an offsetting entry dated today.
    #[instrument(skip(self, reason))]
    pub async fn reverse_entry(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        reason: &str,
    ) -> Result<ReversalOutcome, LedgerError> {
        let mut original = self.get_entry(tenant_id, entry_id).await?;
        let now = self.clock.now();

        let original_status = self.store.period_status(tenant_id, original.period()?).await?;
        let reversal_period = FiscalPeriod::from_date(now.date_naive())?;
        let reversal_status = self.store.period_status(tenant_id, reversal_period).await?;

        let mut reversal = original.reverse(now, reason, original_status, reversal_status)?;
        self.store.save(&[&reversal, &original]).await?;
        original.mark_committed();
        reversal.mark_committed();

        info!(reversal_id = %reversal.id(), "journal entry reversed");
        Ok(ReversalOutcome { original, reversal })
    }

    /// Re-dates a POSTED entry to `new_date`.
    #[instrument(skip(self))]
    pub async fn backvalue_entry(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        new_date: NaiveDate,
    ) -> Result<JournalEntry, LedgerError> {
        let mut entry = self.get_entry(tenant_id, entry_id).await?;

        let current_status = self.store.period_status(tenant_id, entry.period()?).await?;
        let target_status = self
            .store
            .period_status(tenant_id, FiscalPeriod::from_date(new_date)?)
            .await?;

        let previous = entry.effective_date();
        entry.set_effective_date(new_date, self.clock.now(), current_status, target_status)?;
        self.store.save(&[&entry]).await?;
        entry.mark_committed();

        info!(%previous, version = entry.version(), "journal entry back-valued");
        Ok(entry)
    }

    /// Closes a fiscal period. One-way.
    #[instrument(skip(self), fields(period = %period))]
    pub async fn close_period(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<(), LedgerError> {
        self.store
            .close_period(tenant_id, period, self.clock.now())
            .await?;
        info!("fiscal period closed");
        Ok(())
    }

    /// Status of a fiscal period.
    pub async fn period_status(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<PeriodStatus, LedgerError> {
        self.store.period_status(tenant_id, period).await
    }

    /// Running balance, or the balance as of a date.
    pub async fn get_balance(
        &self,
        account: &AccountCode,
        currency: CurrencyCode,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountBalance, LedgerError> {
        self.store.get_balance(account, currency, as_of).await
    }

    /// Loads one entry.
    pub async fn get_entry(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    ) -> Result<JournalEntry, LedgerError> {
        self.store
            .find_entry(tenant_id, entry_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("journal entry {entry_id}")))
    }

    /// Entries posting to `account` between `from` and `to` inclusive.
    pub async fn list_entries_for_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        if from > to {
            return Ok(Vec::new());
        }
        self.store
            .entries_for_account(tenant_id, account, from, to)
            .await
    }

    /// Internal side of a nostro reconciliation: every posting on the nostro
    /// mirror account in the date range, in statement terms.
    pub async fn nostro_feed(
        &self,
        tenant_id: TenantId,
        nostro_account: &AccountCode,
        currency: Option<CurrencyCode>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InternalLedgerEntry>, LedgerError> {
        let entries = self
            .list_entries_for_account(tenant_id, nostro_account, from, to)
            .await?;
        Ok(internal_entries(&entries, nostro_account, currency))
    }
}
