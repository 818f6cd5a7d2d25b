//! Business rule validation for posting pairs.
//!
//! These checks run before a [`super::JournalEntry`] is constructed or
//! transitioned. They are pure and never touch storage.

use std::collections::BTreeMap;

use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;

use super::error::ValidationError;
use super::posting::PostingPair;

/// Checks that there is at least one pair and that, for every currency
/// present, the pair amounts sum to a strictly positive total.
///
/// Each pair is balanced by construction, so this is a structural sanity
/// check rather than a trial balance across accounts.
pub fn validate_postings(pairs: &[PostingPair]) -> Result<(), ValidationError> {
    if pairs.is_empty() {
        return Err(ValidationError::NoPostings);
    }

    let mut totals: BTreeMap<CurrencyCode, Decimal> = BTreeMap::new();
    for pair in pairs {
        *totals.entry(pair.currency).or_default() += pair.amount;
    }

    match totals.into_iter().find(|(_, total)| *total <= Decimal::ZERO) {
        Some((currency, total)) => Err(ValidationError::NonPositiveTotal { currency, total }),
        None => Ok(()),
    }
}

/// Rejects any pair whose debit and credit account are the same.
pub fn validate_not_self_posting(pairs: &[PostingPair]) -> Result<(), ValidationError> {
    match pairs
        .iter()
        .position(|pair| pair.debit_account == pair.credit_account)
    {
        Some(index) => Err(ValidationError::SelfPosting {
            index,
            account: pairs[index].debit_account.to_string(),
        }),
        None => Ok(()),
    }
}

/// Rejects any individual pair with a zero or negative amount.
pub fn validate_amounts(pairs: &[PostingPair]) -> Result<(), ValidationError> {
    match pairs.iter().position(|pair| pair.amount <= Decimal::ZERO) {
        Some(index) => Err(ValidationError::NonPositiveAmount {
            index,
            amount: pairs[index].amount,
        }),
        None => Ok(()),
    }
}

/// Runs every posting rule in order.
pub fn validate_all(pairs: &[PostingPair]) -> Result<(), ValidationError> {
    validate_postings(pairs)?;
    validate_not_self_posting(pairs)?;
    validate_amounts(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::ledger::account::AccountCode;

    const CASH: &str = "1000";
    const REVENUE: &str = "4000";

    fn pair(debit: &str, credit: &str, amount: Decimal, currency: &str) -> PostingPair {
        PostingPair {
            debit_account: AccountCode::new(debit).unwrap(),
            credit_account: AccountCode::new(credit).unwrap(),
            amount,
            currency: CurrencyCode::new(currency).unwrap(),
            description: String::new(),
        }
    }

    #[test]
    fn test_single_pair_passes() {
        let pairs = vec![pair(CASH, REVENUE, dec!(100.00), "USD")];
        assert!(validate_postings(&pairs).is_ok());
        assert!(validate_all(&pairs).is_ok());
    }

    #[test]
    fn test_empty_fails() {
        assert_eq!(validate_postings(&[]), Err(ValidationError::NoPostings));
        assert_eq!(validate_all(&[]), Err(ValidationError::NoPostings));
    }

    #[test]
    fn test_non_positive_total_fails() {
        let pairs = vec![
            pair(CASH, REVENUE, dec!(50), "USD"),
            pair(CASH, REVENUE, dec!(-50), "USD"),
        ];
        assert_eq!(
            validate_postings(&pairs),
            Err(ValidationError::NonPositiveTotal {
                currency: CurrencyCode::new("USD").unwrap(),
                total: dec!(0),
            })
        );
    }

    #[test]
    fn test_totals_are_per_currency() {
        let pairs = vec![
            pair(CASH, REVENUE, dec!(10), "USD"),
            pair(CASH, REVENUE, dec!(-1), "EUR"),
        ];
        assert!(matches!(
            validate_postings(&pairs),
            Err(ValidationError::NonPositiveTotal { currency, .. }) if currency.as_str() == "EUR"
        ));
    }

    #[test]
    fn test_self_posting_fails_regardless_of_amount() {
        for amount in [dec!(0), dec!(1), dec!(-3)] {
            let pairs = vec![pair(CASH, REVENUE, dec!(5), "USD"), pair(CASH, CASH, amount, "USD")];
            assert_eq!(
                validate_not_self_posting(&pairs),
                Err(ValidationError::SelfPosting {
                    index: 1,
                    account: CASH.to_string(),
                })
            );
        }
    }

    #[test]
    fn test_individual_amount_must_be_positive() {
        let pairs = vec![
            pair(CASH, REVENUE, dec!(100), "USD"),
            pair(CASH, REVENUE, dec!(-10), "USD"),
        ];
        assert!(validate_postings(&pairs).is_ok());
        assert_eq!(
            validate_all(&pairs),
            Err(ValidationError::NonPositiveAmount {
                index: 1,
                amount: dec!(-10),
            })
        );
    }
}
