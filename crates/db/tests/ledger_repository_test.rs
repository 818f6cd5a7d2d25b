//! Integration tests for the PostgreSQL ledger repositories.
//!
//! These run only when `DATABASE_URL` points at a disposable database; they
//! are skipped otherwise. Each test uses a fresh tenant and fresh account
//! codes so runs do not interfere.

#![allow(clippy::unwrap_used)]

use std::{env, sync::Arc};

use chrono::{NaiveDate, TimeZone, Utc};
use futures::future::join_all;
use ledger_core::{
    clock::{Clock, FixedClock},
    ledger::{
        AccountCode, EntryStatus, FiscalPeriod, JournalEntry, LedgerError, LedgerService,
        NewJournalEntry, PeriodStatus, PostingPair, ports::JournalStore,
    },
    outbox::{OutboxSource, OutboxRecord},
};
use ledger_db::{
    LedgerRepository, OutboxRepository,
    entities::fiscal_periods,
    migration::{Migrator, MigratorTrait},
};
use ledger_shared::types::{CurrencyCode, TenantId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Statement,
};
use tokio::sync::OnceCell;
use uuid::Uuid;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn setup() -> Option<DatabaseConnection> {
    let Ok(url) = env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };
    let db = ledger_db::connect(&url).await.unwrap();
    MIGRATED
        .get_or_init(|| async {
            let migrator_db = ledger_db::connect(&url).await.unwrap();
            Migrator::up(&migrator_db, None).await.unwrap();
        })
        .await;
    Some(db)
}

struct Fixture {
    service: LedgerService<LedgerRepository, Arc<FixedClock>>,
    repo: Arc<LedgerRepository>,
    outbox: OutboxRepository,
    clock: Arc<FixedClock>,
    tenant: TenantId,
    cash: String,
    revenue: String,
}

fn fresh_code() -> String {
    let n = Uuid::new_v4().as_u128();
    format!("{:04}-{:03}", n % 10_000, (n / 10_000) % 1_000)
}

fn fixture(db: DatabaseConnection) -> Fixture {
    let repo = Arc::new(LedgerRepository::new(db.clone()));
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap(),
    ));
    Fixture {
        service: LedgerService::new(repo.clone(), clock.clone()),
        repo,
        outbox: OutboxRepository::new(db),
        clock,
        tenant: TenantId::new(),
        cash: fresh_code(),
        revenue: fresh_code(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").unwrap()
}

fn sale(f: &Fixture, day: NaiveDate, amount: Decimal) -> NewJournalEntry {
    NewJournalEntry {
        tenant_id: f.tenant,
        effective_date: day,
        postings: vec![PostingPair::new(&f.cash, &f.revenue, amount, "USD", "Sale").unwrap()],
        description: "Cash sale".to_string(),
        reference: format!("REF-{}", Uuid::new_v4()),
    }
}

async fn balance(f: &Fixture, code: &str, as_of: Option<NaiveDate>) -> Decimal {
    f.service
        .get_balance(&AccountCode::new(code).unwrap(), usd(), as_of)
        .await
        .unwrap()
        .amount
}

#[tokio::test]
async fn test_post_writes_entry_balances_and_outbox() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);

    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(100.00)))
        .await
        .unwrap();

    let loaded = f.service.get_entry(f.tenant, entry.id()).await.unwrap();
    assert_eq!(loaded.postings(), entry.postings());
    assert_eq!(loaded.version(), 1);
    assert_eq!(balance(&f, &f.cash, None).await, dec!(100.00));
    assert_eq!(balance(&f, &f.revenue, None).await, dec!(-100.00));

    let records = f
        .outbox
        .records_for_aggregate(entry.id().into_inner())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, "ledger.entry.posted");
    assert!(records[0].published_at.is_none());
}

#[tokio::test]
async fn test_reversal_round_trip() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(42.50)))
        .await
        .unwrap();

    let outcome = f
        .service
        .reverse_entry(f.tenant, entry.id(), "duplicate")
        .await
        .unwrap();

    let original = f.service.get_entry(f.tenant, entry.id()).await.unwrap();
    assert_eq!(original.status(), EntryStatus::Reversed);
    assert_eq!(original.reversed_by(), Some(outcome.reversal.id()));
    assert_eq!(balance(&f, &f.cash, None).await, Decimal::ZERO);

    let types: Vec<String> = f
        .outbox
        .records_for_aggregate(entry.id().into_inner())
        .await
        .unwrap()
        .into_iter()
        .map(|r: OutboxRecord| r.event_type)
        .collect();
    assert_eq!(types, vec!["ledger.entry.posted", "ledger.entry.reversed"]);
}

#[tokio::test]
async fn test_concurrent_writers_have_one_winner() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(10)))
        .await
        .unwrap();

    let mut copies: Vec<(JournalEntry, JournalEntry)> = Vec::new();
    for _ in 0..4 {
        let mut stale = f.service.get_entry(f.tenant, entry.id()).await.unwrap();
        let reversal = stale
            .reverse(f.clock.now(), "race", PeriodStatus::Open, PeriodStatus::Open)
            .unwrap();
        copies.push((stale, reversal));
    }

    let batches: Vec<[&JournalEntry; 2]> = copies
        .iter()
        .map(|(stale, reversal)| [stale, reversal])
        .collect();
    let results = join_all(batches.iter().map(|batch| f.repo.save(batch))).await;

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::OptimisticLock { expected: 1, .. })))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 3);
    // Losers left no trace: the original nets to zero exactly once.
    assert_eq!(balance(&f, &f.cash, None).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_closed_period_blocks_posting() {
    let Some(db) = setup().await else { return };
    let f = fixture(db.clone());
    let january = FiscalPeriod::new(2024, 1).unwrap();

    f.service.close_period(f.tenant, january).await.unwrap();
    let err = f.service.close_period(f.tenant, january).await.unwrap_err();
    assert!(matches!(err, LedgerError::PeriodAlreadyClosed { .. }));

    let err = f
        .service
        .post_entry(sale(&f, date(2024, 1, 3), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PeriodClosed { .. }));
    assert_eq!(
        f.service.period_status(f.tenant, january).await.unwrap(),
        PeriodStatus::Closed
    );

    let row = fiscal_periods::Entity::find()
        .filter(fiscal_periods::Column::TenantId.eq(f.tenant.into_inner()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let records = f.outbox.records_for_aggregate(row.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, "ledger.period.closed");
}

#[tokio::test]
async fn test_save_rechecks_period_inside_transaction() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let january = FiscalPeriod::new(2024, 1).unwrap();

    // Built while January was still open, saved after it closed.
    let entry = JournalEntry::post(
        sale(&f, date(2024, 1, 10), dec!(25.00)),
        f.clock.now(),
        PeriodStatus::Open,
    )
    .unwrap();
    f.service.close_period(f.tenant, january).await.unwrap();

    let err = f.repo.save(&[&entry]).await.unwrap_err();

    assert!(matches!(err, LedgerError::PeriodClosed { period } if period == january));
    assert!(matches!(
        f.service.get_entry(f.tenant, entry.id()).await,
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(balance(&f, &f.cash, None).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_backvalue_changes_point_in_time_balance() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(40)))
        .await
        .unwrap();

    assert_eq!(balance(&f, &f.cash, Some(date(2024, 1, 10))).await, Decimal::ZERO);
    f.service
        .backvalue_entry(f.tenant, entry.id(), date(2024, 1, 5))
        .await
        .unwrap();
    assert_eq!(balance(&f, &f.cash, Some(date(2024, 1, 10))).await, dec!(40));
    assert_eq!(balance(&f, &f.revenue, Some(date(2024, 1, 10))).await, dec!(-40));
}

#[tokio::test]
async fn test_entries_for_account_filters_range() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let early = f
        .service
        .post_entry(sale(&f, date(2024, 1, 2), dec!(1)))
        .await
        .unwrap();
    f.service
        .post_entry(sale(&f, date(2024, 1, 18), dec!(1)))
        .await
        .unwrap();

    let found = f
        .service
        .list_entries_for_account(
            f.tenant,
            &AccountCode::new(&f.cash).unwrap(),
            date(2024, 1, 1),
            date(2024, 1, 10),
        )
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), early.id());
}

#[tokio::test]
async fn test_mark_published_stamps_records() {
    let Some(db) = setup().await else { return };
    let f = fixture(db);
    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(5)))
        .await
        .unwrap();
    let records = f
        .outbox
        .records_for_aggregate(entry.id().into_inner())
        .await
        .unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id).collect();

    f.outbox.mark_published(&ids, f.clock.now()).await.unwrap();

    let records = f
        .outbox
        .records_for_aggregate(entry.id().into_inner())
        .await
        .unwrap();
    assert!(records.iter().all(|r| r.published_at == Some(f.clock.now())));
}

#[tokio::test]
async fn test_journal_rows_cannot_be_deleted() {
    let Some(db) = setup().await else { return };
    let f = fixture(db.clone());
    let entry = f
        .service
        .post_entry(sale(&f, date(2024, 1, 15), dec!(5)))
        .await
        .unwrap();

    let result = db
        .execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            "DELETE FROM journal_entries WHERE id = $1",
            [entry.id().into_inner().into()],
        ))
        .await;

    assert!(result.is_err());
}
