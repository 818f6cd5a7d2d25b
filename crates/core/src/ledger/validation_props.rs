//! Property-based tests for posting validation rules.

use std::collections::BTreeMap;

use ledger_shared::types::CurrencyCode;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::account::AccountCode;
use super::error::ValidationError;
use super::posting::PostingPair;
use super::validation::{validate_all, validate_not_self_posting, validate_postings};

/// Strategy to generate a signed amount between -10,000.00 and 10,000.00.
fn signed_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate a positive amount (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn account_code() -> impl Strategy<Value = AccountCode> {
    prop_oneof![
        (0u32..10_000).prop_map(|n| format!("{n:04}")),
        (0u32..10_000, 0u32..1_000).prop_map(|(n, s)| format!("{n:04}-{s:03}")),
    ]
    .prop_map(|code| AccountCode::new(code).unwrap())
}

fn currency() -> impl Strategy<Value = CurrencyCode> {
    prop_oneof![Just("USD"), Just("EUR"), Just("GBP"), Just("JPY")]
        .prop_map(|code| CurrencyCode::new(code).unwrap())
}

/// A pair with arbitrary (possibly equal) accounts and a signed amount.
fn any_pair() -> impl Strategy<Value = PostingPair> {
    (account_code(), account_code(), signed_amount(), currency()).prop_map(
        |(debit_account, credit_account, amount, currency)| PostingPair {
            debit_account,
            credit_account,
            amount,
            currency,
            description: String::new(),
        },
    )
}

/// A well-formed pair: distinct accounts, positive amount.
fn valid_pair() -> impl Strategy<Value = PostingPair> {
    (account_code(), account_code(), positive_amount(), currency())
        .prop_filter("accounts must differ", |(d, c, _, _)| d != c)
        .prop_map(|(debit_account, credit_account, amount, currency)| PostingPair {
            debit_account,
            credit_account,
            amount,
            currency,
            description: "line".to_string(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property: totals decide validity**
    ///
    /// *For any* non-empty set of pairs, `validate_postings` succeeds iff
    /// every currency's pair-amount sum is strictly positive.
    #[test]
    fn prop_validate_postings_iff_totals_positive(
        pairs in prop::collection::vec(any_pair(), 1..12),
    ) {
        let mut totals: BTreeMap<CurrencyCode, Decimal> = BTreeMap::new();
        for pair in &pairs {
            *totals.entry(pair.currency).or_default() += pair.amount;
        }
        let expected_ok = totals.values().all(|total| *total > Decimal::ZERO);

        let result = validate_postings(&pairs);
        prop_assert_eq!(result.is_ok(), expected_ok, "result: {:?}", result);
    }

    /// **Property: self-posting is always rejected**
    ///
    /// *For any* amount and account, a pair debiting and crediting the same
    /// account fails `validate_not_self_posting`.
    #[test]
    fn prop_self_posting_rejected(
        account in account_code(),
        amount in signed_amount(),
        currency in currency(),
        others in prop::collection::vec(valid_pair(), 0..5),
    ) {
        let mut pairs = others;
        let index = pairs.len();
        pairs.push(PostingPair {
            debit_account: account.clone(),
            credit_account: account.clone(),
            amount,
            currency,
            description: String::new(),
        });

        prop_assert_eq!(
            validate_not_self_posting(&pairs),
            Err(ValidationError::SelfPosting { index, account: account.to_string() })
        );
    }

    /// **Property: well-formed pairs always validate**
    #[test]
    fn prop_valid_pairs_accepted(pairs in prop::collection::vec(valid_pair(), 1..12)) {
        prop_assert!(validate_all(&pairs).is_ok());
    }
}
