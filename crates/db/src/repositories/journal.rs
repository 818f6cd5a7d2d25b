//! Journal entry persistence.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use ledger_core::{
    ledger::{
        AccountCode, EntryStatus, JournalEntry, JournalEntryRecord, LedgerError, PostingPair,
        balance_deltas, ports::JournalStore,
    },
    outbox::{Aggregate, OutboxRecord},
};
use ledger_shared::types::{CurrencyCode, JournalEntryId, TenantId};
use sea_orm::{
    ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait, sea_query::Expr,
};
use tracing::debug;
use uuid::Uuid;

use super::{
    LedgerRepository, balance, corrupt, fiscal, is_unique_violation, outbox, storage, utc,
};
use crate::entities::{journal_entries, journal_postings};

#[async_trait]
impl JournalStore for LedgerRepository {
    async fn save(&self, entries: &[&JournalEntry]) -> Result<(), LedgerError> {
        let mut periods = BTreeSet::new();
        for entry in entries {
            for period in entry.touched_periods()? {
                periods.insert((entry.tenant_id(), period));
            }
        }

        let txn = self.db.begin().await.map_err(storage)?;
        for (tenant_id, period) in periods {
            fiscal::ensure_period_open(&txn, tenant_id, period).await?;
        }

        // Inserts first: an update may reference a new entry via reversed_by.
        let (inserts, updates): (Vec<&JournalEntry>, Vec<&JournalEntry>) =
            entries.iter().copied().partition(|entry| entry.is_new());

        for entry in &inserts {
            insert_entry(&txn, entry).await?;
        }
        let new_postings: Vec<PostingPair> = inserts
            .iter()
            .flat_map(|entry| entry.postings().iter().cloned())
            .collect();
        let now = inserts
            .iter()
            .map(|entry| entry.created_at())
            .max()
            .unwrap_or_else(chrono::Utc::now);
        balance::apply_deltas(&txn, &balance_deltas(&new_postings), now).await?;

        for entry in &updates {
            update_entry(&txn, entry).await?;
        }

        let records: Vec<OutboxRecord> = entries
            .iter()
            .flat_map(|entry| OutboxRecord::for_aggregate(*entry))
            .collect();
        outbox::insert_records(&txn, &records)
            .await
            .map_err(storage)?;

        txn.commit().await.map_err(storage)?;
        debug!(
            inserted = inserts.len(),
            updated = updates.len(),
            events = records.len(),
            "journal entries saved"
        );
        Ok(())
    }

    async fn find_entry(
        &self,
        tenant_id: TenantId,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let Some(row) = journal_entries::Entity::find_by_id(id.into_inner())
            .filter(journal_entries::Column::TenantId.eq(tenant_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };

        let postings = journal_postings::Entity::find()
            .filter(journal_postings::Column::EntryId.eq(row.id))
            .order_by_asc(journal_postings::Column::Seq)
            .all(&self.db)
            .await
            .map_err(storage)?;

        to_entry(row, postings).map(Some)
    }

    async fn entries_for_account(
        &self,
        tenant_id: TenantId,
        account: &AccountCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let touching = journal_postings::Entity::find()
            .select_only()
            .column(journal_postings::Column::EntryId)
            .filter(
                Condition::any()
                    .add(journal_postings::Column::DebitAccount.eq(account.as_str()))
                    .add(journal_postings::Column::CreditAccount.eq(account.as_str())),
            )
            .into_query();

        let rows = journal_entries::Entity::find()
            .filter(journal_entries::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(journal_entries::Column::EffectiveDate.between(from, to))
            .filter(journal_entries::Column::Id.in_subquery(touching))
            .order_by_asc(journal_entries::Column::EffectiveDate)
            .order_by_asc(journal_entries::Column::CreatedAt)
            .order_by_asc(journal_entries::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut postings: HashMap<Uuid, Vec<journal_postings::Model>> = HashMap::new();
        for posting in journal_postings::Entity::find()
            .filter(journal_postings::Column::EntryId.is_in(ids))
            .order_by_asc(journal_postings::Column::EntryId)
            .order_by_asc(journal_postings::Column::Seq)
            .all(&self.db)
            .await
            .map_err(storage)?
        {
            postings.entry(posting.entry_id).or_default().push(posting);
        }

        rows.into_iter()
            .map(|row| {
                let pairs = postings.remove(&row.id).unwrap_or_default();
                to_entry(row, pairs)
            })
            .collect()
    }
}

async fn insert_entry(txn: &DatabaseTransaction, entry: &JournalEntry) -> Result<(), LedgerError> {
    let record = entry.to_record();
    let id = record.id.into_inner();

    let row = journal_entries::ActiveModel {
        id: Set(id),
        tenant_id: Set(record.tenant_id.into_inner()),
        effective_date: Set(record.effective_date),
        status: Set(record.status.as_str().to_string()),
        description: Set(record.description),
        reference: Set(record.reference),
        version: Set(record.version),
        reversal_of: Set(record.reversal_of.map(JournalEntryId::into_inner)),
        reversed_by: Set(record.reversed_by.map(JournalEntryId::into_inner)),
        created_at: Set(record.created_at.into()),
        updated_at: Set(record.updated_at.into()),
    };
    journal_entries::Entity::insert(row)
        .exec_without_returning(txn)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LedgerError::OptimisticLock {
                    aggregate_id: id,
                    expected: 0,
                }
            } else {
                storage(err)
            }
        })?;

    let postings = record.postings.iter().zip(1..).map(|(pair, seq)| {
        journal_postings::ActiveModel {
            entry_id: Set(id),
            seq: Set(seq),
            debit_account: Set(pair.debit_account.as_str().to_string()),
            credit_account: Set(pair.credit_account.as_str().to_string()),
            amount: Set(pair.amount),
            currency: Set(pair.currency.as_str().to_string()),
            description: Set(pair.description.clone()),
        }
    });
    journal_postings::Entity::insert_many(postings)
        .exec_without_returning(txn)
        .await
        .map_err(storage)?;
    Ok(())
}

/// Compare-and-swap on the stored version.
async fn update_entry(txn: &DatabaseTransaction, entry: &JournalEntry) -> Result<(), LedgerError> {
    let record = entry.to_record();
    let expected = entry.expected_version();

    let result = journal_entries::Entity::update_many()
        .col_expr(
            journal_entries::Column::Status,
            Expr::value(record.status.as_str()),
        )
        .col_expr(
            journal_entries::Column::EffectiveDate,
            Expr::value(record.effective_date),
        )
        .col_expr(journal_entries::Column::Version, Expr::value(record.version))
        .col_expr(
            journal_entries::Column::ReversedBy,
            Expr::value(record.reversed_by.map(JournalEntryId::into_inner)),
        )
        .col_expr(
            journal_entries::Column::UpdatedAt,
            Expr::value(record.updated_at),
        )
        .filter(journal_entries::Column::Id.eq(record.id.into_inner()))
        .filter(journal_entries::Column::TenantId.eq(record.tenant_id.into_inner()))
        .filter(journal_entries::Column::Version.eq(expected))
        .exec(txn)
        .await
        .map_err(storage)?;

    if result.rows_affected == 0 {
        return Err(LedgerError::OptimisticLock {
            aggregate_id: record.id.into_inner(),
            expected,
        });
    }
    Ok(())
}

fn to_entry(
    row: journal_entries::Model,
    postings: Vec<journal_postings::Model>,
) -> Result<JournalEntry, LedgerError> {
    let postings = postings
        .into_iter()
        .map(|p| {
            Ok(PostingPair {
                debit_account: AccountCode::new(&p.debit_account)
                    .map_err(|e| corrupt("journal_postings", e))?,
                credit_account: AccountCode::new(&p.credit_account)
                    .map_err(|e| corrupt("journal_postings", e))?,
                amount: p.amount,
                currency: CurrencyCode::new(p.currency.trim())
                    .map_err(|e| corrupt("journal_postings", e))?,
                description: p.description,
            })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;

    Ok(JournalEntry::rehydrate(JournalEntryRecord {
        id: JournalEntryId::from_uuid(row.id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        effective_date: row.effective_date,
        postings,
        status: row.status.parse::<EntryStatus>()?,
        description: row.description,
        reference: row.reference,
        version: row.version,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
        reversal_of: row.reversal_of.map(JournalEntryId::from_uuid),
        reversed_by: row.reversed_by.map(JournalEntryId::from_uuid),
    }))
}
