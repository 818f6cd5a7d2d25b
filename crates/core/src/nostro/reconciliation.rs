//! Nostro reconciliation: matches statement lines against internal ledger
//! entries.
//!
//! Matching is first-fit per external entry, in input order. Candidates are
//! the internal entries sharing the external reference; the first one not
//! yet consumed and with the same direction is taken, whether or not the
//! amounts agree. Mismatches are results, never errors.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::ReconciliationError;
use super::statement::Direction;

/// One line of the correspondent's statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStatementEntry {
    /// Match key.
    pub reference: String,
    /// Value date.
    pub value_date: NaiveDate,
    /// Statement direction.
    pub direction: Direction,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Free-text details.
    pub details: String,
}

/// One internal posting on the nostro mirror account, in statement terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLedgerEntry {
    /// Identifier of the posting.
    pub entry_id: String,
    /// Match key.
    pub reference: String,
    /// Effective date of the journal entry.
    pub value_date: NaiveDate,
    /// Direction as the correspondent would report it.
    pub direction: Direction,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Posting description.
    pub description: String,
}

/// Outcome for one external entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Reference, direction and amount agree.
    Matched,
    /// Reference and direction agree, amount differs.
    AmountMismatch,
    /// No usable internal entry.
    MissingLocal,
}

impl ReconciliationStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "MATCHED",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::MissingLocal => "MISSING_LOCAL",
        }
    }
}

/// Reconciliation of one external entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// The statement line.
    pub external: ExternalStatementEntry,
    /// The internal entry it was paired with, if any.
    pub internal: Option<InternalLedgerEntry>,
    /// Outcome.
    pub status: ReconciliationStatus,
    /// `external - internal`; zero unless the amounts differ.
    pub amount_delta: Decimal,
    /// Human-readable explanation.
    pub remarks: String,
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Date of the statement.
    pub statement_date: NaiveDate,
    /// Nostro account reconciled.
    pub account_id: String,
    /// One result per processed external entry, in input order.
    pub results: Vec<ReconciliationResult>,
    /// Number of external entries supplied.
    pub total_external: usize,
    /// Number of internal entries supplied.
    pub total_internal: usize,
    /// Results with status MATCHED.
    pub matched: usize,
    /// Results with status `AMOUNT_MISMATCH`.
    pub amount_mismatches: usize,
    /// Results with status `MISSING_LOCAL`.
    pub missing_local: usize,
    /// Internal entries never paired.
    pub unmatched_local: usize,
    /// The run was cancelled before every external entry was processed.
    pub interrupted: bool,
}

impl ReconciliationSummary {
    fn record(&mut self, result: ReconciliationResult) {
        match result.status {
            ReconciliationStatus::Matched => self.matched += 1,
            ReconciliationStatus::AmountMismatch => self.amount_mismatches += 1,
            ReconciliationStatus::MissingLocal => self.missing_local += 1,
        }
        self.results.push(result);
    }

    /// True when every external entry matched and no internal entry is left.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.interrupted
            && self.matched == self.total_external
            && self.unmatched_local == 0
    }
}

/// Reconciles a statement against internal entries.
///
/// # Errors
///
/// [`ReconciliationError::MissingAccountId`] when `account_id` is blank.
pub fn reconcile(
    account_id: &str,
    statement_date: NaiveDate,
    external: &[ExternalStatementEntry],
    internal: &[InternalLedgerEntry],
) -> Result<ReconciliationSummary, ReconciliationError> {
    run(account_id, statement_date, external, internal, || false)
}

/// Like [`reconcile`], but checks `cancel` before each external entry and
/// returns the partial summary, flagged `interrupted`, once it fires.
///
/// Internal entries not consumed by the processed prefix count as
/// `unmatched_local`.
///
/// # Errors
///
/// [`ReconciliationError::MissingAccountId`] when `account_id` is blank.
pub fn reconcile_until_cancelled(
    account_id: &str,
    statement_date: NaiveDate,
    external: &[ExternalStatementEntry],
    internal: &[InternalLedgerEntry],
    cancel: &CancellationToken,
) -> Result<ReconciliationSummary, ReconciliationError> {
    run(account_id, statement_date, external, internal, || {
        cancel.is_cancelled()
    })
}

fn run(
    account_id: &str,
    statement_date: NaiveDate,
    external: &[ExternalStatementEntry],
    internal: &[InternalLedgerEntry],
    mut should_stop: impl FnMut() -> bool,
) -> Result<ReconciliationSummary, ReconciliationError> {
    if account_id.trim().is_empty() {
        return Err(ReconciliationError::MissingAccountId);
    }

    let mut by_reference: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, entry) in internal.iter().enumerate() {
        by_reference
            .entry(entry.reference.as_str())
            .or_default()
            .push(index);
    }
    let mut consumed = vec![false; internal.len()];

    let mut summary = ReconciliationSummary {
        statement_date,
        account_id: account_id.to_string(),
        results: Vec::with_capacity(external.len()),
        total_external: external.len(),
        total_internal: internal.len(),
        matched: 0,
        amount_mismatches: 0,
        missing_local: 0,
        unmatched_local: 0,
        interrupted: false,
    };

    for ext in external {
        if should_stop() {
            summary.interrupted = true;
            debug!(processed = summary.results.len(), "reconciliation cancelled");
            break;
        }

        let Some(candidates) = by_reference.get(ext.reference.as_str()) else {
            summary.record(missing(
                ext,
                format!("no internal entry found for reference {}", ext.reference),
            ));
            continue;
        };

        let selected = candidates
            .iter()
            .copied()
            .find(|&index| !consumed[index] && internal[index].direction == ext.direction);

        let Some(index) = selected else {
            summary.record(missing(
                ext,
                format!(
                    "no unmatched internal entry for reference {} with direction {}",
                    ext.reference, ext.direction
                ),
            ));
            continue;
        };

        consumed[index] = true;
        let candidate = &internal[index];
        let result = if candidate.amount == ext.amount {
            ReconciliationResult {
                external: ext.clone(),
                internal: Some(candidate.clone()),
                status: ReconciliationStatus::Matched,
                amount_delta: Decimal::ZERO,
                remarks: "exact match".to_string(),
            }
        } else {
            let delta = ext.amount - candidate.amount;
            ReconciliationResult {
                external: ext.clone(),
                internal: Some(candidate.clone()),
                status: ReconciliationStatus::AmountMismatch,
                amount_delta: delta,
                remarks: format!("amount differs by {delta}"),
            }
        };
        summary.record(result);
    }

    summary.unmatched_local = consumed.iter().filter(|used| !**used).count();

    info!(
        account_id,
        %statement_date,
        matched = summary.matched,
        amount_mismatches = summary.amount_mismatches,
        missing_local = summary.missing_local,
        unmatched_local = summary.unmatched_local,
        interrupted = summary.interrupted,
        "reconciliation complete"
    );
    Ok(summary)
}

fn missing(ext: &ExternalStatementEntry, remarks: String) -> ReconciliationResult {
    ReconciliationResult {
        external: ext.clone(),
        internal: None,
        status: ReconciliationStatus::MissingLocal,
        amount_delta: Decimal::ZERO,
        remarks,
    }
}
