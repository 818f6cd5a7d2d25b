//! Outbox relay.
//!
//! Polls `outbox_events` for unpublished records, forwards them in
//! `created_at` order and stamps `published_at`. Delivery is at-least-once.
//! The bus transport is not wired here: records are published to the
//! structured log under the `ledger::events` target.

use std::{io, time::Duration};

use async_trait::async_trait;
use ledger_core::{
    clock::SystemClock,
    outbox::{EventPublisher, OutboxRecord, OutboxRelay, PublishError},
};
use ledger_db::{OutboxRepository, connect_with};
use ledger_shared::{AppConfig, logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Publishes each record as one structured log event.
struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        info!(
            target: "ledger::events",
            event_id = %record.id,
            event_type = %record.event_type,
            aggregate_type = %record.aggregate_type,
            aggregate_id = %record.aggregate_id,
            payload = %record.payload,
            "event published"
        );
        Ok(())
    }
}

/// Cancels `cancel` once `signal` fires. If the signal cannot be listened
/// for, the relay keeps running.
async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested");
            cancel.cancel();
        }
        Err(err) => {
            error!(error = %err, "failed to listen for shutdown signal");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init(&config.logging);

    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let relay = OutboxRelay::new(
        OutboxRepository::new(db),
        TracingPublisher,
        SystemClock,
        config.relay.batch_size,
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown));

    let relayed = relay
        .run(cancel, Duration::from_millis(config.relay.poll_interval_ms))
        .await;
    info!(relayed, "Relay exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_relay() {
        let cancel = CancellationToken::new();

        cancel_on_signal(async { Ok(()) }, cancel.clone()).await;

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_listener_failure_keeps_relay_running() {
        let cancel = CancellationToken::new();

        cancel_on_signal(
            async { Err(io::Error::other("no signal handler")) },
            cancel.clone(),
        )
        .await;

        assert!(!cancel.is_cancelled());
    }
}
