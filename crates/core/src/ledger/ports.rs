//! Storage ports implemented by the in-memory store and the database layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledger_shared::types::{CurrencyCode, JournalEntryId, TenantId};

use super::account::AccountCode;
use super::balance::AccountBalance;
use super::entry::JournalEntry;
use super::error::LedgerError;
use super::fiscal::{FiscalPeriod, PeriodStatus};

/// Journal entry persistence with the transactional outbox.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Persists `entries` and their pending events in one storage transaction.
    ///
    /// New entries (expected version 0) are inserted and their balance
    /// deltas applied. Existing entries are updated only if the stored
    /// version still equals their expected version, otherwise the whole call
    /// fails with [`LedgerError::OptimisticLock`]. Every period an entry
    /// touches (see [`JournalEntry::touched_periods`]) is re-checked inside
    /// the transaction and a CLOSED one fails the call with
    /// [`LedgerError::PeriodClosed`], so a concurrent close cannot be
    /// bypassed. One outbox record per pending event is inserted. Either
    /// everything commits or nothing does.
    ///
    /// Callers invoke `mark_committed` on each entry after success.
    async fn save(&self, entries: &[&JournalEntry]) -> Result<(), LedgerError>;

    /// Loads one entry of `tenant_id`.
    async fn find_entry(
        &self,
        tenant_id: TenantId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, LedgerError>;

    /// Entries of `tenant_id` with a posting on `account` and an effective
    /// date in `from..=to`, ordered by effective date then creation time.
    async fn entries_for_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError>;
}

/// Read side of the balance ledger.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Balance of `(account, currency)`.
    ///
    /// Without `as_of` this reads the running balance (zero when the key
    /// has never been posted to). With `as_of` it sums the postings of all
    /// entries whose effective date is on or before that date.
    async fn get_balance(
        &self,
        account: &AccountCode,
        currency: CurrencyCode,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountBalance, LedgerError>;
}

/// Fiscal period state.
#[async_trait]
pub trait FiscalPeriodStore: Send + Sync {
    /// Status of the period; OPEN when nothing is stored for it.
    async fn period_status(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<PeriodStatus, LedgerError>;

    /// Marks the period CLOSED and appends a `ledger.period.closed` outbox
    /// record in the same transaction.
    ///
    /// Fails with [`LedgerError::PeriodAlreadyClosed`] if it is closed.
    async fn close_period(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
        closed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;
}

/// Everything the ledger service needs from storage.
pub trait LedgerStore: JournalStore + BalanceReader + FiscalPeriodStore {}

impl<T: JournalStore + BalanceReader + FiscalPeriodStore> LedgerStore for T {}
