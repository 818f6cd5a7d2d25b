//! Adapters feeding the reconciliation engine from both sides.

use ledger_shared::types::CurrencyCode;

use super::reconciliation::{ExternalStatementEntry, InternalLedgerEntry};
use super::statement::{Direction, StatementEntry, StatementMessage};
use crate::ledger::{AccountCode, JournalEntry};

impl From<&StatementEntry> for ExternalStatementEntry {
    fn from(entry: &StatementEntry) -> Self {
        Self {
            reference: entry.reference.clone(),
            value_date: entry.value_date,
            direction: entry.mark.direction(),
            amount: entry.amount,
            details: entry.supplementary_details.clone(),
        }
    }
}

impl StatementMessage {
    /// Statement lines in reconciliation form.
    #[must_use]
    pub fn external_entries(&self) -> Vec<ExternalStatementEntry> {
        self.entries.iter().map(ExternalStatementEntry::from).collect()
    }
}

/// Postings on the nostro mirror account, one row per posting pair.
///
/// The mirror account is an asset: a ledger debit on it is money arriving at
/// the correspondent, which the correspondent reports as a credit. Row ids
/// are `{entry_id}/{seq}` with `seq` the 1-based position of the pair.
/// When `currency` is set, pairs in other currencies are skipped.
#[must_use]
pub fn internal_entries(
    entries: &[JournalEntry],
    nostro: &AccountCode,
    currency: Option<CurrencyCode>,
) -> Vec<InternalLedgerEntry> {
    let mut rows = Vec::new();
    for entry in entries {
        for (index, pair) in entry.postings().iter().enumerate() {
            if !pair.touches(nostro) || currency.is_some_and(|c| c != pair.currency) {
                continue;
            }
            let direction = if &pair.debit_account == nostro {
                Direction::Credit
            } else {
                Direction::Debit
            };
            let description = if pair.description.is_empty() {
                entry.description().to_string()
            } else {
                pair.description.clone()
            };
            rows.push(InternalLedgerEntry {
                entry_id: format!("{}/{}", entry.id(), index + 1),
                reference: entry.reference().to_string(),
                value_date: entry.effective_date(),
                direction,
                amount: pair.amount,
                description,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use ledger_shared::types::TenantId;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::ledger::{NewJournalEntry, PeriodStatus, PostingPair};
    use crate::nostro::{EntryMark, ReconciliationStatus, parse_mt950, reconcile};

    const NOSTRO: &str = "1200-001";

    fn posted(reference: &str, postings: Vec<PostingPair>) -> JournalEntry {
        JournalEntry::post(
            NewJournalEntry {
                tenant_id: TenantId::new(),
                effective_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
                postings,
                description: "Wire".to_string(),
                reference: reference.to_string(),
            },
            Utc.with_ymd_and_hms(2023, 1, 16, 8, 0, 0).unwrap(),
            PeriodStatus::Open,
        )
        .unwrap()
    }

    fn nostro() -> AccountCode {
        AccountCode::new(NOSTRO).unwrap()
    }

    #[test]
    fn test_reversal_marks_map_to_effective_direction() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let mut line = StatementEntry {
            value_date: day,
            entry_date: day,
            mark: EntryMark::ReversalCredit,
            amount: dec!(5),
            transaction_type: "NTRF".to_string(),
            reference: "R".to_string(),
            supplementary_details: "returned".to_string(),
        };
        assert_eq!(ExternalStatementEntry::from(&line).direction, Direction::Debit);

        line.mark = EntryMark::ReversalDebit;
        let external = ExternalStatementEntry::from(&line);
        assert_eq!(external.direction, Direction::Credit);
        assert_eq!(external.details, "returned");
        assert_eq!(external.reference, "R");
    }

    #[test]
    fn test_internal_rows_per_posting() {
        let entry = posted(
            "SPLIT",
            vec![
                PostingPair::new(NOSTRO, "2000", dec!(70), "USD", "").unwrap(),
                PostingPair::new("5000", "1000", dec!(1), "USD", "fee").unwrap(),
                PostingPair::new("6000", NOSTRO, dec!(30), "USD", "charge").unwrap(),
                PostingPair::new(NOSTRO, "2000", dec!(9), "EUR", "").unwrap(),
            ],
        );

        let rows = internal_entries(
            std::slice::from_ref(&entry),
            &nostro(),
            Some(CurrencyCode::new("USD").unwrap()),
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entry_id, format!("{}/1", entry.id()));
        assert_eq!(rows[0].direction, Direction::Credit);
        assert_eq!(rows[0].description, "Wire");
        assert_eq!(rows[1].entry_id, format!("{}/3", entry.id()));
        assert_eq!(rows[1].direction, Direction::Debit);
        assert_eq!(rows[1].description, "charge");
        assert!(rows.iter().all(|r| r.reference == "SPLIT"));

        let all = internal_entries(std::slice::from_ref(&entry), &nostro(), None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_statement_reconciles_against_ledger() {
        let raw = ":20:STMT1\n:25:ACC1\n:60F:C230115USD1000,00\n\
                   :61:230115C500,00NTRFREF2\n:86:Incoming wire\n\
                   :61:230115D25,00NCHGREF3\n\
                   :62F:C230115USD1475,00";
        let message = parse_mt950(raw).unwrap();
        let ledger = vec![
            posted(
                "REF2",
                vec![PostingPair::new(NOSTRO, "2000", dec!(500.00), "USD", "").unwrap()],
            ),
            posted(
                "REF4",
                vec![PostingPair::new(NOSTRO, "2000", dec!(10.00), "USD", "").unwrap()],
            ),
        ];

        let summary = reconcile(
            &message.account,
            message.statement_date().unwrap(),
            &message.external_entries(),
            &internal_entries(&ledger, &nostro(), None),
        )
        .unwrap();

        assert_eq!(summary.results[0].status, ReconciliationStatus::Matched);
        assert_eq!(summary.results[1].status, ReconciliationStatus::MissingLocal);
        assert_eq!(summary.unmatched_local, 1);
        assert_eq!(summary.total_internal, 2);
    }
}
