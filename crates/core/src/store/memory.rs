//! In-memory implementation of every ledger port.
//!
//! A single mutex stands in for the storage transaction: each write checks
//! all of its preconditions first and only then mutates, so a failed call
//! leaves no trace.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledger_shared::types::{CurrencyCode, JournalEntryId, OutboxRecordId, TenantId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{
    AccountBalance, AccountCode, FiscalPeriod, JournalEntry, LedgerError, LedgerEvent,
    PeriodStatus,
    balance::{balance_deltas, delta_for},
    fiscal::ensure_open,
    ports::{BalanceReader, FiscalPeriodStore, JournalStore},
};
use crate::outbox::{
    Aggregate, OutboxRecord,
    relay::{OutboxSource, RelayError},
};

#[derive(Debug, Clone)]
struct StoredPeriod {
    status: PeriodStatus,
    closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<JournalEntryId, JournalEntry>,
    balances: BTreeMap<(AccountCode, CurrencyCode), Decimal>,
    periods: HashMap<(TenantId, FiscalPeriod), StoredPeriod>,
    outbox: Vec<OutboxRecord>,
}

/// Transactional in-memory ledger store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
    fail_next_write: AtomicBool,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next write fail with a storage error after its checks pass,
    /// as if the commit itself failed.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// All outbox records in insertion order.
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.lock().outbox.clone()
    }

    /// Number of records not yet relayed.
    pub fn unpublished_count(&self) -> usize {
        self.lock().outbox.iter().filter(|r| r.is_pending()).count()
    }

    /// Number of stored journal entries.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// When the period was closed, if it was.
    pub fn closed_at(&self, tenant_id: TenantId, period: FiscalPeriod) -> Option<DateTime<Utc>> {
        self.lock()
            .periods
            .get(&(tenant_id, period))
            .and_then(|p| p.closed_at)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn injected_failure(&self) -> Result<(), LedgerError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            Err(LedgerError::Storage("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JournalStore for InMemoryLedgerStore {
    async fn save(&self, entries: &[&JournalEntry]) -> Result<(), LedgerError> {
        let mut state = self.lock();

        // Check every precondition before touching state.
        for entry in entries {
            let expected = entry.expected_version();
            let current = state.entries.get(&entry.id()).map(JournalEntry::version);
            let conflict = match current {
                None => expected != 0,
                Some(stored) => stored != expected,
            };
            if conflict {
                return Err(LedgerError::OptimisticLock {
                    aggregate_id: entry.aggregate_id(),
                    expected,
                });
            }
            for period in entry.touched_periods()? {
                let status = state
                    .periods
                    .get(&(entry.tenant_id(), period))
                    .map_or(PeriodStatus::Open, |p| p.status);
                ensure_open(period, status)?;
            }
        }
        let records: Vec<OutboxRecord> = entries
            .iter()
            .flat_map(|entry| OutboxRecord::for_aggregate(*entry))
            .collect();
        self.injected_failure()?;

        for entry in entries {
            if entry.is_new() {
                for delta in balance_deltas(entry.postings()) {
                    *state
                        .balances
                        .entry((delta.account, delta.currency))
                        .or_default() += delta.amount;
                }
            }
            let mut stored = (*entry).clone();
            stored.mark_committed();
            state.entries.insert(stored.id(), stored);
        }
        state.outbox.extend(records);
        Ok(())
    }

    async fn find_entry(
        &self,
        tenant_id: TenantId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        Ok(self
            .lock()
            .entries
            .get(&id)
            .filter(|entry| entry.tenant_id() == tenant_id)
            .cloned())
    }

    async fn entries_for_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let mut found: Vec<JournalEntry> = self
            .lock()
            .entries
            .values()
            .filter(|entry| entry.tenant_id() == tenant_id)
            .filter(|entry| (from..=to).contains(&entry.effective_date()))
            .filter(|entry| entry.postings().iter().any(|pair| pair.touches(account)))
            .cloned()
            .collect();
        found.sort_by_key(|entry| (entry.effective_date(), entry.created_at(), entry.id()));
        Ok(found)
    }
}

#[async_trait]
impl BalanceReader for InMemoryLedgerStore {
    async fn get_balance(
        &self,
        account: &AccountCode,
        currency: CurrencyCode,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountBalance, LedgerError> {
        let state = self.lock();
        let mut balance = AccountBalance::zero(account.clone(), currency, as_of);

        match as_of {
            None => {
                if let Some(amount) = state.balances.get(&(account.clone(), currency)) {
                    balance.apply(*amount);
                }
            }
            Some(date) => {
                for entry in state.entries.values().filter(|e| e.effective_date() <= date) {
                    balance.apply(delta_for(entry.postings(), account, currency));
                }
            }
        }
        Ok(balance)
    }
}

#[async_trait]
impl FiscalPeriodStore for InMemoryLedgerStore {
    async fn period_status(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<PeriodStatus, LedgerError> {
        Ok(self
            .lock()
            .periods
            .get(&(tenant_id, period))
            .map_or(PeriodStatus::Open, |p| p.status))
    }

    async fn close_period(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
        closed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let key = (tenant_id, period);

        if state
            .periods
            .get(&key)
            .is_some_and(|p| p.status == PeriodStatus::Closed)
        {
            return Err(LedgerError::PeriodAlreadyClosed { period });
        }
        let event = LedgerEvent::period_closed(Uuid::now_v7(), tenant_id, period, closed_at);
        let record = OutboxRecord::from_event(&event);
        self.injected_failure()?;

        state.periods.insert(
            key,
            StoredPeriod {
                status: PeriodStatus::Closed,
                closed_at: Some(closed_at),
            },
        );
        state.outbox.push(record);
        Ok(())
    }
}

#[async_trait]
impl OutboxSource for InMemoryLedgerStore {
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxRecord>, RelayError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut pending: Vec<OutboxRecord> = self
            .lock()
            .outbox
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(
        &self,
        ids: &[OutboxRecordId],
        published_at: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        let mut state = self.lock();
        for record in state.outbox.iter_mut().filter(|r| ids.contains(&r.id)) {
            if record.published_at.is_none() {
                record.published_at = Some(published_at);
            }
        }
        Ok(())
    }
}
