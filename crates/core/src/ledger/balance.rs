//! Per-account, per-currency running balances.
//!
//! A balance is only ever changed by applying signed deltas derived from a
//! journal entry's postings: the debit account receives `+amount`, the credit
//! account `-amount`. Stores apply the deltas in the same transaction that
//! first persists the entry.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountCode;
use super::posting::PostingPair;

/// Balance of one `(account, currency)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account code.
    pub account: AccountCode,
    /// Currency of the balance.
    pub currency: CurrencyCode,
    /// Signed amount; debits positive.
    pub amount: Decimal,
    /// Point in time the balance was computed for; `None` for the running balance.
    pub as_of: Option<NaiveDate>,
}

impl AccountBalance {
    /// A zero balance.
    #[must_use]
    pub const fn zero(account: AccountCode, currency: CurrencyCode, as_of: Option<NaiveDate>) -> Self {
        Self {
            account,
            currency,
            amount: Decimal::ZERO,
            as_of,
        }
    }

    /// Applies a signed adjustment.
    pub fn apply(&mut self, delta: Decimal) {
        self.amount += delta;
    }
}

/// A signed adjustment to one balance key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Account code.
    pub account: AccountCode,
    /// Currency.
    pub currency: CurrencyCode,
    /// Signed change.
    pub amount: Decimal,
}

/// Nets the balance effect of `postings` per `(account, currency)`.
///
/// The result is sorted by key so that concurrent writers lock balance rows
/// in the same order. Keys whose movements cancel out are kept with a zero
/// delta.
#[must_use]
pub fn balance_deltas(postings: &[PostingPair]) -> Vec<BalanceDelta> {
    let mut net: BTreeMap<(&AccountCode, CurrencyCode), Decimal> = BTreeMap::new();
    for pair in postings {
        *net.entry((&pair.debit_account, pair.currency)).or_default() += pair.amount;
        *net.entry((&pair.credit_account, pair.currency)).or_default() -= pair.amount;
    }

    net.into_iter()
        .map(|((account, currency), amount)| BalanceDelta {
            account: account.clone(),
            currency,
            amount,
        })
        .collect()
}

/// The signed effect of `postings` on a single balance key.
#[must_use]
pub fn delta_for(postings: &[PostingPair], account: &AccountCode, currency: CurrencyCode) -> Decimal {
    postings
        .iter()
        .filter(|pair| pair.currency == currency)
        .map(|pair| {
            let mut delta = Decimal::ZERO;
            if &pair.debit_account == account {
                delta += pair.amount;
            }
            if &pair.credit_account == account {
                delta -= pair.amount;
            }
            delta
        })
        .sum()
}
