//! Running balances and point-in-time balance queries.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::ledger::{AccountBalance, AccountCode, BalanceDelta, LedgerError, ports::BalanceReader};
use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, EntityTrait, FromQueryResult, Statement,
};

use super::{LedgerRepository, storage};
use crate::entities::account_balances;

const UPSERT_BALANCE_SQL: &str = r"
INSERT INTO account_balances (account_code, currency, amount, updated_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (account_code, currency)
DO UPDATE SET amount = account_balances.amount + EXCLUDED.amount,
              updated_at = EXCLUDED.updated_at
";

const BALANCE_AS_OF_SQL: &str = r"
SELECT COALESCE(SUM(CASE WHEN p.debit_account = $1 THEN p.amount ELSE -p.amount END), 0) AS amount
FROM journal_postings p
JOIN journal_entries e ON e.id = p.entry_id
WHERE (p.debit_account = $1 OR p.credit_account = $1)
  AND p.currency = $2
  AND e.effective_date <= $3
";

#[derive(Debug, FromQueryResult)]
struct AmountRow {
    amount: Decimal,
}

/// Applies signed deltas inside `txn`.
///
/// `deltas` must be sorted by key so concurrent writers take row locks in the
/// same order.
pub(crate) async fn apply_deltas(
    txn: &DatabaseTransaction,
    deltas: &[BalanceDelta],
    at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    for delta in deltas {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            UPSERT_BALANCE_SQL,
            [
                delta.account.as_str().into(),
                delta.currency.as_str().into(),
                delta.amount.into(),
                at.into(),
            ],
        );
        txn.execute(stmt).await.map_err(storage)?;
    }
    Ok(())
}

#[async_trait]
impl BalanceReader for LedgerRepository {
    async fn get_balance(
        &self,
        account: &AccountCode,
        currency: CurrencyCode,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountBalance, LedgerError> {
        let mut balance = AccountBalance::zero(account.clone(), currency, as_of);

        let amount = match as_of {
            None => account_balances::Entity::find_by_id((
                account.as_str().to_string(),
                currency.as_str().to_string(),
            ))
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(|row| row.amount),
            Some(date) => AmountRow::find_by_statement(Statement::from_sql_and_values(
                DbBackend::Postgres,
                BALANCE_AS_OF_SQL,
                [
                    account.as_str().into(),
                    currency.as_str().into(),
                    date.into(),
                ],
            ))
            .one(&self.db)
            .await
            .map_err(storage)?
            .map(|row| row.amount),
        };

        if let Some(amount) = amount {
            balance.apply(amount);
        }
        Ok(balance)
    }
}
