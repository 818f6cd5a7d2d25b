//! Statement parsing and reconciliation errors.

use thiserror::Error;

/// Defect in a single field payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Payload is shorter than the field grammar allows.
    #[error("too short: need at least {min} characters, got {len}")]
    TooShort {
        /// Minimum length.
        min: usize,
        /// Actual length.
        len: usize,
    },

    /// Debit/credit mark is not one of the accepted codes.
    #[error("invalid debit/credit mark '{0}'")]
    BadDirection(String),

    /// Date is not a valid `YYMMDD`.
    #[error("invalid date '{0}'")]
    BadDate(String),

    /// Currency is not a 3-letter code.
    #[error("invalid currency '{0}'")]
    BadCurrency(String),

    /// Amount is missing or not a decimal number.
    #[error("invalid amount '{0}'")]
    BadAmount(String),

    /// Fewer than 4 characters remain for the transaction type.
    #[error("invalid transaction type '{0}'")]
    BadTransactionType(String),
}

/// The statement was rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementError {
    /// Input was empty or whitespace.
    #[error("Empty statement message")]
    Empty,

    /// A required field never appeared.
    #[error("Missing required field :{tag}:")]
    MissingField {
        /// Field tag without colons.
        tag: &'static str,
    },

    /// A field was present but malformed.
    #[error("Malformed field :{tag}:: {source}")]
    Field {
        /// Field tag without colons.
        tag: &'static str,
        /// What was wrong with it.
        #[source]
        source: FieldError,
    },
}

impl StatementError {
    pub(crate) fn field(tag: &'static str) -> impl FnOnce(FieldError) -> Self {
        move |source| Self::Field { tag, source }
    }
}

/// Invalid top-level reconciliation input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    /// The account identifier was empty.
    #[error("Account ID is required")]
    MissingAccountId,
}
