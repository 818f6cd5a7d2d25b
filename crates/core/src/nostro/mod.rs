//! Nostro account reconciliation.
//!
//! - MT950-style statement parsing
//! - First-fit matching of statement lines against internal postings
//! - Adapters from parsed statements and journal entries

pub mod error;
pub mod feed;
pub mod parser;
pub mod reconciliation;
pub mod statement;

pub use error::{FieldError, ReconciliationError, StatementError};
pub use feed::internal_entries;
pub use parser::parse_mt950;
pub use reconciliation::{
    ExternalStatementEntry, InternalLedgerEntry, ReconciliationResult, ReconciliationStatus,
    ReconciliationSummary, reconcile, reconcile_until_cancelled,
};
pub use statement::{Direction, EntryMark, StatementBalance, StatementEntry, StatementMessage};
