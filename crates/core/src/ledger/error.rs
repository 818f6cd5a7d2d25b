//! Ledger error types for validation and state errors.

use chrono::NaiveDate;
use ledger_shared::{
    AppError,
    types::{CurrencyCode, InvalidCurrencyCode},
};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::entry::EntryStatus;
use super::fiscal::FiscalPeriod;

/// Malformed posting input. Never retried; the caller must correct the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The entry carries no posting pairs.
    #[error("no postings")]
    NoPostings,

    /// The pair amounts of one currency do not add up to a positive total.
    #[error("non-positive total for {currency}: {total}")]
    NonPositiveTotal {
        /// Offending currency.
        currency: CurrencyCode,
        /// Sum of the pair amounts in that currency.
        total: Decimal,
    },

    /// A pair debits and credits the same account.
    #[error("self-posting on account {account} (pair {index})")]
    SelfPosting {
        /// Zero-based position of the pair.
        index: usize,
        /// The account used on both legs.
        account: String,
    },

    /// A pair amount is zero or negative.
    #[error("posting amount must be positive, got {amount} (pair {index})")]
    NonPositiveAmount {
        /// Zero-based position of the pair.
        index: usize,
        /// The rejected amount.
        amount: Decimal,
    },

    /// Account code is not `NNNN` or `NNNN-NNN`.
    #[error("invalid account code {0:?}: must match NNNN or NNNN-NNN")]
    InvalidAccountCode(String),

    /// Currency is not a three-letter ISO 4217 code.
    #[error(transparent)]
    InvalidCurrency(#[from] InvalidCurrencyCode),

    /// Journal entry description is blank.
    #[error("description is required")]
    EmptyDescription,

    /// Year or month outside the supported fiscal calendar.
    #[error("invalid fiscal period {year}-{month:02}")]
    InvalidPeriod {
        /// Requested year.
        year: i32,
        /// Requested month.
        month: u32,
    },
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Input Errors ==========
    /// Posting input failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // ========== Fiscal Period Errors ==========
    /// The operation targets a closed fiscal period.
    #[error("Fiscal period {period} is closed")]
    PeriodClosed {
        /// The closed period.
        period: FiscalPeriod,
    },

    /// The period was already closed.
    #[error("Fiscal period {period} is already closed")]
    PeriodAlreadyClosed {
        /// The period.
        period: FiscalPeriod,
    },

    // ========== State Errors ==========
    /// The entry's status does not allow the requested action.
    #[error("Cannot {action} a journal entry in status {from}")]
    InvalidTransition {
        /// Current status.
        from: EntryStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Back-valuation to a date after today.
    #[error("Back-value date {date} is in the future (today is {today})")]
    FutureBackvalue {
        /// Requested effective date.
        date: NaiveDate,
        /// Current date.
        today: NaiveDate,
    },

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    // ========== Concurrency Errors ==========
    /// Another writer modified the aggregate first.
    #[error("Optimistic lock failed for {aggregate_id}: expected version {expected}")]
    OptimisticLock {
        /// The aggregate that was modified concurrently.
        aggregate_id: Uuid,
        /// The version this writer based its change on.
        expected: i64,
    },

    // ========== Infrastructure Errors ==========
    /// Event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage transaction failed; nothing was committed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::PeriodAlreadyClosed { .. } => "PERIOD_ALREADY_CLOSED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::FutureBackvalue { .. } => "FUTURE_BACKVALUE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::OptimisticLock { .. } => "OPTIMISTIC_LOCK",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::Validation(_) | Self::FutureBackvalue { .. } => 400,

            // 404 Not Found
            Self::NotFound(_) => 404,

            // 409 Conflict - concurrency errors
            Self::OptimisticLock { .. } => 409,

            // 422 Unprocessable - business rules
            Self::PeriodClosed { .. }
            | Self::PeriodAlreadyClosed { .. }
            | Self::InvalidTransition { .. } => 422,

            // 500 Internal Server Error
            Self::Serialization(_) | Self::Storage(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. })
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::Validation(_) | LedgerError::FutureBackvalue { .. } => {
                Self::Validation(message)
            }
            LedgerError::PeriodClosed { .. }
            | LedgerError::PeriodAlreadyClosed { .. }
            | LedgerError::InvalidTransition { .. } => Self::BusinessRule(message),
            LedgerError::OptimisticLock { .. } => Self::Conflict(message),
            LedgerError::NotFound(what) => Self::NotFound(what),
            LedgerError::Storage(_) => Self::Database(message),
            LedgerError::Serialization(_) => Self::Internal(message),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
