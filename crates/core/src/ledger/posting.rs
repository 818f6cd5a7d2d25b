//! Posting pairs: the atomic unit of a journal entry.

use std::fmt;

use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountCode;
use super::error::ValidationError;

/// One debit leg and one credit leg sharing a single amount.
///
/// A pair is balanced by construction. Whole-entry rules (non-empty, positive
/// totals, no self-posting) are enforced by [`super::validation`] before a
/// journal entry is built from a set of pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingPair {
    /// Account receiving the debit leg.
    pub debit_account: AccountCode,
    /// Account receiving the credit leg.
    pub credit_account: AccountCode,
    /// Amount moved; positive.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: CurrencyCode,
    /// Free-text line description.
    pub description: String,
}

impl PostingPair {
    /// Builds a pair from raw inputs, rejecting malformed codes, non-positive
    /// amounts and same-account legs.
    pub fn new(
        debit_account: &str,
        credit_account: &str,
        amount: Decimal,
        currency: &str,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let debit_account = AccountCode::new(debit_account)?;
        let credit_account = AccountCode::new(credit_account)?;
        let currency = CurrencyCode::new(currency)?;

        if debit_account == credit_account {
            return Err(ValidationError::SelfPosting {
                index: 0,
                account: debit_account.into(),
            });
        }
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount { index: 0, amount });
        }

        Ok(Self {
            debit_account,
            credit_account,
            amount,
            currency,
            description: description.into(),
        })
    }

    /// Returns the offsetting pair: legs swapped, description prefixed with
    /// `Reversal: `.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            debit_account: self.credit_account.clone(),
            credit_account: self.debit_account.clone(),
            amount: self.amount,
            currency: self.currency,
            description: format!("Reversal: {}", self.description),
        }
    }

    /// Returns true if either leg posts to `account`.
    #[must_use]
    pub fn touches(&self, account: &AccountCode) -> bool {
        &self.debit_account == account || &self.credit_account == account
    }
}

impl fmt::Display for PostingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DR {} / CR {}: {} {}",
            self.debit_account, self.credit_account, self.amount, self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_accepts_valid_pair() {
        let pair = PostingPair::new("1000", "4000", dec!(100.00), "USD", "Sale").unwrap();
        assert_eq!(pair.to_string(), "DR 1000 / CR 4000: 100.00 USD");
    }

    #[test]
    fn test_new_rejects_same_account() {
        assert!(matches!(
            PostingPair::new("1000", "1000", dec!(1), "USD", ""),
            Err(ValidationError::SelfPosting { .. })
        ));
    }

    #[test]
    fn test_new_rejects_non_positive_amount() {
        assert!(matches!(
            PostingPair::new("1000", "4000", dec!(0), "USD", ""),
            Err(ValidationError::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            PostingPair::new("1000", "4000", dec!(-5), "USD", ""),
            Err(ValidationError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn test_new_rejects_bad_currency_and_codes() {
        assert!(matches!(
            PostingPair::new("1000", "4000", dec!(1), "usd", ""),
            Err(ValidationError::InvalidCurrency(_))
        ));
        assert!(matches!(
            PostingPair::new("CASH", "4000", dec!(1), "USD", ""),
            Err(ValidationError::InvalidAccountCode(_))
        ));
    }

    #[test]
    fn test_reversed_swaps_legs() {
        let pair = PostingPair::new("1000", "4000", dec!(25.50), "EUR", "Fee").unwrap();
        let rev = pair.reversed();
        assert_eq!(rev.debit_account, pair.credit_account);
        assert_eq!(rev.credit_account, pair.debit_account);
        assert_eq!(rev.amount, dec!(25.50));
        assert_eq!(rev.description, "Reversal: Fee");
    }
}
