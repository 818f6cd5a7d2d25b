//! Fiscal period state.
//!
//! Only closed periods are stored; a missing row means OPEN.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    ledger::{
        FiscalPeriod, LedgerError, LedgerEvent, PeriodStatus, ensure_open,
        ports::FiscalPeriodStore,
    },
    outbox::OutboxRecord,
};
use ledger_shared::types::TenantId;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, QueryFilter, QuerySelect, Set, Statement, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use super::{LedgerRepository, is_unique_violation, outbox, storage};
use crate::entities::fiscal_periods;

// Open periods have no row to lock, so writers and closers meet on an
// advisory lock keyed by tenant and period instead.
const LOCK_PERIOD_SHARED_SQL: &str =
    "SELECT pg_advisory_xact_lock_shared(hashtextextended($1, 0))";
const LOCK_PERIOD_EXCLUSIVE_SQL: &str = "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))";

fn lock_key(tenant_id: TenantId, period: FiscalPeriod) -> String {
    format!("fiscal_period:{tenant_id}:{period}")
}

async fn lock_period(
    txn: &DatabaseTransaction,
    tenant_id: TenantId,
    period: FiscalPeriod,
    sql: &str,
) -> Result<(), DbErr> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        [lock_key(tenant_id, period).into()],
    ))
    .await
    .map(|_| ())
}

/// Takes the shared period lock inside `txn` and fails with
/// [`LedgerError::PeriodClosed`] if the period is closed.
///
/// The lock is held until `txn` ends, so `close_period` cannot commit in
/// between. Callers lock periods in sorted order.
pub(crate) async fn ensure_period_open(
    txn: &DatabaseTransaction,
    tenant_id: TenantId,
    period: FiscalPeriod,
) -> Result<(), LedgerError> {
    lock_period(txn, tenant_id, period, LOCK_PERIOD_SHARED_SQL)
        .await
        .map_err(storage)?;
    let status = match find_period(txn, tenant_id, period, false)
        .await
        .map_err(storage)?
    {
        Some(row) => row.status.parse()?,
        None => PeriodStatus::Open,
    };
    ensure_open(period, status)
}

async fn find_period<C: ConnectionTrait>(
    conn: &C,
    tenant_id: TenantId,
    period: FiscalPeriod,
    for_update: bool,
) -> Result<Option<fiscal_periods::Model>, DbErr> {
    let mut query = fiscal_periods::Entity::find()
        .filter(fiscal_periods::Column::TenantId.eq(tenant_id.into_inner()))
        .filter(fiscal_periods::Column::Year.eq(period.year()))
        .filter(fiscal_periods::Column::Month.eq(period.month().cast_signed()));
    if for_update {
        query = query.lock_exclusive();
    }
    query.one(conn).await
}

#[async_trait]
impl FiscalPeriodStore for LedgerRepository {
    async fn period_status(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
    ) -> Result<PeriodStatus, LedgerError> {
        match find_period(&self.db, tenant_id, period, false)
            .await
            .map_err(storage)?
        {
            Some(row) => row.status.parse(),
            None => Ok(PeriodStatus::Open),
        }
    }

    async fn close_period(
        &self,
        tenant_id: TenantId,
        period: FiscalPeriod,
        closed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let txn = self.db.begin().await.map_err(storage)?;
        lock_period(&txn, tenant_id, period, LOCK_PERIOD_EXCLUSIVE_SQL)
            .await
            .map_err(storage)?;

        let existing = find_period(&txn, tenant_id, period, true)
            .await
            .map_err(storage)?;
        let period_id = match existing {
            Some(row) if row.status.parse::<PeriodStatus>()? == PeriodStatus::Closed => {
                return Err(LedgerError::PeriodAlreadyClosed { period });
            }
            Some(row) => {
                let id = row.id;
                let mut active: fiscal_periods::ActiveModel = row.into();
                active.status = Set(PeriodStatus::Closed.as_str().to_string());
                active.closed_at = Set(Some(closed_at.into()));
                active.update(&txn).await.map_err(storage)?;
                id
            }
            None => {
                let id = Uuid::now_v7();
                let row = fiscal_periods::ActiveModel {
                    id: Set(id),
                    tenant_id: Set(tenant_id.into_inner()),
                    year: Set(period.year()),
                    month: Set(period.month().cast_signed()),
                    status: Set(PeriodStatus::Closed.as_str().to_string()),
                    closed_at: Set(Some(closed_at.into())),
                };
                fiscal_periods::Entity::insert(row)
                    .exec_without_returning(&txn)
                    .await
                    .map_err(|err| {
                        if is_unique_violation(&err) {
                            LedgerError::PeriodAlreadyClosed { period }
                        } else {
                            storage(err)
                        }
                    })?;
                id
            }
        };

        let event = LedgerEvent::period_closed(period_id, tenant_id, period, closed_at);
        outbox::insert_records(&txn, &[OutboxRecord::from_event(&event)])
            .await
            .map_err(storage)?;

        txn.commit().await.map_err(storage)?;
        debug!(%period, %period_id, "fiscal period row closed");
        Ok(())
    }
}
