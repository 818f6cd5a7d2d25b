//! Core ledger logic.
//!
//! Pure domain code plus the storage ports it needs. No database or web
//! dependencies live here; `ledger-db` implements the ports against
//! PostgreSQL and [`store::InMemoryLedgerStore`] implements them in memory.
//!
//! # Modules
//!
//! - `ledger` - Double-entry postings, journal entries, balances, fiscal periods
//! - `outbox` - Domain event contract, outbox records and the relay
//! - `nostro` - Statement parsing and nostro reconciliation
//! - `store` - In-memory transactional store
//! - `clock` - Time source

pub mod clock;
pub mod ledger;
pub mod nostro;
pub mod outbox;
pub mod store;
