//! Double-entry ledger.
//!
//! - Account codes and posting pairs
//! - Posting validation
//! - The journal entry aggregate and its events
//! - Balance deltas and balance reads
//! - Fiscal periods and the posting gate
//! - Storage ports and the ledger service

pub mod account;
pub mod balance;
pub mod entry;
pub mod error;
pub mod events;
pub mod fiscal;
pub mod ports;
pub mod posting;
pub mod retry;
pub mod service;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use account::AccountCode;
pub use balance::{AccountBalance, BalanceDelta, balance_deltas};
pub use entry::{EntryStatus, JournalEntry, JournalEntryRecord, NewJournalEntry};
pub use error::{LedgerError, ValidationError};
pub use events::{EventMetadata, LedgerEvent};
pub use fiscal::{FiscalPeriod, PeriodStatus, ensure_open};
pub use ports::{BalanceReader, FiscalPeriodStore, JournalStore, LedgerStore};
pub use posting::PostingPair;
pub use retry::retry_on_conflict;
pub use service::{LedgerService, ReversalOutcome};
pub use validation::{validate_all, validate_not_self_posting, validate_postings};
