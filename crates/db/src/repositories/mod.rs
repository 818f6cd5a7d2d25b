//! Repository implementations of the ledger storage ports.
//!
//! Every write runs in one database transaction; dropping an uncommitted
//! transaction rolls it back.

pub mod balance;
pub mod fiscal;
pub mod journal;
pub mod outbox;

pub use outbox::OutboxRepository;

use chrono::{DateTime, FixedOffset, Utc};
use ledger_core::ledger::LedgerError;
use sea_orm::{DatabaseConnection, DbErr, SqlErr};

/// PostgreSQL implementation of `JournalStore`, `BalanceReader` and
/// `FiscalPeriodStore`.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

pub(crate) fn storage(err: DbErr) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("corrupt {what} row: {detail}"))
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub(crate) fn utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}
