//! Parsed MT950 statement.

use std::fmt;

use chrono::NaiveDate;
use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Debit or credit, from the statement issuer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `D`
    #[serde(rename = "D")]
    Debit,
    /// `C`
    #[serde(rename = "C")]
    Credit,
}

impl Direction {
    /// Single-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Debit => "D",
            Self::Credit => "C",
        }
    }

    pub(crate) fn from_code(code: &str) -> Option<Self> {
        match code {
            "D" => Some(Self::Debit),
            "C" => Some(Self::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Debit/credit mark of a `:61:` line, including reversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMark {
    /// `D`
    #[serde(rename = "D")]
    Debit,
    /// `C`
    #[serde(rename = "C")]
    Credit,
    /// `RC`, reversal of a credit.
    #[serde(rename = "RC")]
    ReversalCredit,
    /// `RD`, reversal of a debit.
    #[serde(rename = "RD")]
    ReversalDebit,
}

impl EntryMark {
    /// Statement code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Debit => "D",
            Self::Credit => "C",
            Self::ReversalCredit => "RC",
            Self::ReversalDebit => "RD",
        }
    }

    /// Effective direction of the movement. A reversed credit debits the
    /// account and a reversed debit credits it.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Debit | Self::ReversalCredit => Direction::Debit,
            Self::Credit | Self::ReversalDebit => Direction::Credit,
        }
    }
}

impl fmt::Display for EntryMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Opening (`:60F:`) or closing (`:62F:`) balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBalance {
    /// Debit or credit balance.
    pub direction: Direction,
    /// Balance date.
    pub date: NaiveDate,
    /// Balance currency.
    pub currency: CurrencyCode,
    /// Unsigned amount.
    pub amount: Decimal,
}

/// One `:61:` statement line with its `:86:` details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementEntry {
    /// Value date.
    pub value_date: NaiveDate,
    /// Booking date; equals the value date unless overridden.
    pub entry_date: NaiveDate,
    /// Debit/credit mark.
    pub mark: EntryMark,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Four-character transaction type, e.g. `NTRF`.
    pub transaction_type: String,
    /// Servicing institution's reference.
    pub reference: String,
    /// Free text from `:86:` and its continuation lines.
    pub supplementary_details: String,
}

/// A parsed statement message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementMessage {
    /// Sender's reference (`:20:`).
    pub reference: String,
    /// Account identification (`:25:`).
    pub account: String,
    /// Statement/sequence number (`:28C:`).
    pub statement_number: Option<String>,
    /// Opening balance (`:60F:`).
    pub opening_balance: Option<StatementBalance>,
    /// Statement lines in message order.
    pub entries: Vec<StatementEntry>,
    /// Closing balance (`:62F:`).
    pub closing_balance: Option<StatementBalance>,
}

impl StatementMessage {
    /// Date the statement reports on: the closing balance date, else the
    /// opening balance date, else the last entry's value date.
    #[must_use]
    pub fn statement_date(&self) -> Option<NaiveDate> {
        self.closing_balance
            .as_ref()
            .or(self.opening_balance.as_ref())
            .map(|balance| balance.date)
            .or_else(|| self.entries.last().map(|entry| entry.value_date))
    }
}
