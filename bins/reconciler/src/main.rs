//! Nostro statement reconciliation.
//!
//! Parses an MT950-style statement file, loads the internal postings on the
//! nostro mirror account for the statement's date range and prints the
//! reconciliation summary as JSON on stdout.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use ledger_core::{
    ledger::{AccountCode, LedgerService},
    nostro::{parse_mt950, reconcile_until_cancelled},
};
use ledger_db::{LedgerRepository, connect_with};
use ledger_shared::{
    AppConfig, AppError, logging,
    types::{CurrencyCode, TenantId},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ledger-reconciler")]
#[command(about = "Reconcile a nostro statement against the ledger")]
struct Cli {
    /// Statement file.
    statement: PathBuf,

    /// Tenant owning the ledger entries.
    #[arg(long)]
    tenant: TenantId,

    /// Ledger account mirroring the nostro account.
    #[arg(long)]
    nostro: AccountCode,

    /// Only consider postings in this currency.
    #[arg(long)]
    currency: Option<CurrencyCode>,

    /// First effective date to load; defaults to the earliest statement line.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last effective date to load; defaults to the statement date.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Pretty-print the summary.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    logging::init(&config.logging);

    let raw = tokio::fs::read_to_string(&cli.statement)
        .await
        .with_context(|| format!("reading {}", cli.statement.display()))?;
    let message = parse_mt950(&raw).context("statement rejected")?;
    let statement_date = message
        .statement_date()
        .unwrap_or_else(|| Utc::now().date_naive());
    info!(
        reference = %message.reference,
        account = %message.account,
        entries = message.entries.len(),
        %statement_date,
        "Statement parsed"
    );

    let from = cli.from.unwrap_or_else(|| {
        message
            .entries
            .iter()
            .map(|entry| entry.value_date)
            .min()
            .unwrap_or(statement_date)
    });
    let to = cli.to.unwrap_or_else(|| {
        message
            .entries
            .iter()
            .map(|entry| entry.value_date)
            .max()
            .map_or(statement_date, |last| last.max(statement_date))
    });

    let db = connect_with(&config.database).await?;
    let service = LedgerService::with_system_clock(Arc::new(LedgerRepository::new(db)));
    let internal = match service
        .nostro_feed(cli.tenant, &cli.nostro, cli.currency, from, to)
        .await
    {
        Ok(internal) => internal,
        Err(err) => {
            let err = AppError::from(err);
            error!(
                code = err.error_code(),
                retryable = err.is_retryable(),
                error = %err,
                "Loading internal entries failed"
            );
            return Err(err.into());
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let summary = reconcile_until_cancelled(
        &message.account,
        statement_date,
        &message.external_entries(),
        &internal,
        &cancel,
    )?;
    if !summary.is_clean() {
        warn!(
            amount_mismatches = summary.amount_mismatches,
            missing_local = summary.missing_local,
            unmatched_local = summary.unmatched_local,
            "Statement has breaks"
        );
    }

    let output = if cli.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{output}");
    Ok(())
}
