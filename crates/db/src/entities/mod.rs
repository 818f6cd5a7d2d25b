//! `SeaORM` entities for the ledger schema.

pub mod prelude;

pub mod account_balances;
pub mod fiscal_periods;
pub mod journal_entries;
pub mod journal_postings;
pub mod outbox_events;
