//! Outbox relay: poll, batch, publish, acknowledge.
//!
//! Delivery is at-least-once. A crash between publishing and stamping
//! `published_at` republishes the record on the next poll, so consumers must
//! handle duplicates by event id.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_shared::types::OutboxRecordId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::OutboxRecord;
use crate::clock::Clock;

/// Failure reading or acknowledging outbox rows.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbox storage failed.
    #[error("Outbox storage error: {0}")]
    Storage(String),
}

/// Failure handing a record to the message bus.
#[derive(Debug, Error)]
#[error("Publish failed: {0}")]
pub struct PublishError(pub String);

/// Read/acknowledge side of the outbox table.
#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// Returns up to `limit` unpublished records ordered by `created_at`.
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxRecord>, RelayError>;

    /// Stamps `published_at` on the given records.
    async fn mark_published(
        &self,
        ids: &[OutboxRecordId],
        published_at: DateTime<Utc>,
    ) -> Result<(), RelayError>;
}

/// Message bus producer.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one record. Returning `Ok` means the bus accepted it.
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: OutboxSource + ?Sized> OutboxSource for Arc<T> {
    async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxRecord>, RelayError> {
        (**self).fetch_unpublished(limit).await
    }

    async fn mark_published(
        &self,
        ids: &[OutboxRecordId],
        published_at: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        (**self).mark_published(ids, published_at).await
    }
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        (**self).publish(record).await
    }
}

/// Result of one relay pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayBatch {
    /// Records fetched.
    pub fetched: usize,
    /// Records published and stamped.
    pub published: usize,
    /// The record whose publish failed, ending the pass early.
    pub halted_at: Option<OutboxRecordId>,
}

/// Drains the outbox to an [`EventPublisher`].
pub struct OutboxRelay<S, P, C> {
    source: S,
    publisher: P,
    clock: C,
    batch_size: u64,
}

impl<S, P, C> OutboxRelay<S, P, C>
where
    S: OutboxSource,
    P: EventPublisher,
    C: Clock,
{
    /// Creates a relay that drains at most `batch_size` records per pass.
    pub fn new(source: S, publisher: P, clock: C, batch_size: u64) -> Self {
        Self {
            source,
            publisher,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one pass.
    ///
    /// Records are published in `created_at` order. The successfully
    /// published prefix is stamped; the first publish failure ends the pass
    /// so later records never overtake an earlier one.
    pub async fn run_once(&self) -> Result<RelayBatch, RelayError> {
        let records = self.source.fetch_unpublished(self.batch_size).await?;
        let mut batch = RelayBatch {
            fetched: records.len(),
            ..RelayBatch::default()
        };
        if records.is_empty() {
            return Ok(batch);
        }

        let mut published = Vec::with_capacity(records.len());
        for record in &records {
            match self.publisher.publish(record).await {
                Ok(()) => published.push(record.id),
                Err(err) => {
                    warn!(
                        record_id = %record.id,
                        event_type = %record.event_type,
                        error = %err,
                        "outbox publish failed; halting batch"
                    );
                    batch.halted_at = Some(record.id);
                    break;
                }
            }
        }

        if !published.is_empty() {
            self.source
                .mark_published(&published, self.clock.now())
                .await?;
        }
        batch.published = published.len();

        debug!(
            fetched = batch.fetched,
            published = batch.published,
            "outbox relay pass complete"
        );
        Ok(batch)
    }

    /// Polls until `cancel` fires, sleeping `interval` between passes that
    /// drained less than a full batch. Returns the number of records relayed.
    pub async fn run(&self, cancel: CancellationToken, interval: Duration) -> u64 {
        info!(batch_size = self.batch_size, ?interval, "outbox relay started");
        let mut total = 0u64;

        while !cancel.is_cancelled() {
            let full_batch = match self.run_once().await {
                Ok(batch) => {
                    total += batch.published as u64;
                    batch.halted_at.is_none() && batch.fetched as u64 == self.batch_size
                }
                Err(err) => {
                    warn!(error = %err, "outbox relay pass failed");
                    false
                }
            };

            if full_batch {
                continue;
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!(relayed = total, "outbox relay stopped");
        total
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::clock::FixedClock;

    #[derive(Default)]
    struct VecSource {
        records: Mutex<Vec<OutboxRecord>>,
    }

    impl VecSource {
        fn with_records(n: usize) -> Self {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let records = (0..n)
                .map(|i| OutboxRecord {
                    id: OutboxRecordId::new(),
                    aggregate_id: Uuid::nil(),
                    aggregate_type: "JournalEntry".to_string(),
                    event_type: "ledger.entry.posted".to_string(),
                    payload: serde_json::json!({ "seq": i }),
                    created_at: base + chrono::Duration::seconds(i64::try_from(i).unwrap()),
                    published_at: None,
                })
                .collect();
            Self {
                records: Mutex::new(records),
            }
        }

        fn pending(&self) -> usize {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.is_pending())
                .count()
        }
    }

    #[async_trait]
    impl OutboxSource for VecSource {
        async fn fetch_unpublished(&self, limit: u64) -> Result<Vec<OutboxRecord>, RelayError> {
            let mut pending: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.is_pending())
                .cloned()
                .collect();
            pending.sort_by_key(|r| r.created_at);
            pending.truncate(usize::try_from(limit).unwrap());
            Ok(pending)
        }

        async fn mark_published(
            &self,
            ids: &[OutboxRecordId],
            published_at: DateTime<Utc>,
        ) -> Result<(), RelayError> {
            for record in self.records.lock().unwrap().iter_mut() {
                if ids.contains(&record.id) {
                    record.published_at = Some(published_at);
                }
            }
            Ok(())
        }
    }

    /// Records every publish; fails the publish numbered `fail_on` (0-based).
    #[derive(Default)]
    struct RecordingPublisher {
        seen: Mutex<Vec<serde_json::Value>>,
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, record: &OutboxRecord) -> Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(call) {
                return Err(PublishError("broker unavailable".to_string()));
            }
            self.seen.lock().unwrap().push(record.payload.clone());
            Ok(())
        }
    }

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_run_once_publishes_in_created_order() {
        let source = Arc::new(VecSource::with_records(3));
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = OutboxRelay::new(source.clone(), publisher.clone(), clock(), 10);

        let batch = relay.run_once().await.unwrap();

        assert_eq!(batch.fetched, 3);
        assert_eq!(batch.published, 3);
        assert_eq!(batch.halted_at, None);
        assert_eq!(source.pending(), 0);
        let seqs: Vec<_> = publisher.seen.lock().unwrap().iter().map(|p| p["seq"].clone()).collect();
        assert_eq!(seqs, vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)]);
    }

    #[tokio::test]
    async fn test_run_once_respects_batch_size() {
        let source = Arc::new(VecSource::with_records(5));
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = OutboxRelay::new(source.clone(), publisher, clock(), 2);

        let batch = relay.run_once().await.unwrap();

        assert_eq!(batch.published, 2);
        assert_eq!(source.pending(), 3);
    }

    #[tokio::test]
    async fn test_failure_stamps_only_the_published_prefix() {
        let source = Arc::new(VecSource::with_records(4));
        let publisher = Arc::new(RecordingPublisher {
            fail_on: Some(2),
            ..RecordingPublisher::default()
        });
        let relay = OutboxRelay::new(source.clone(), publisher.clone(), clock(), 10);

        let batch = relay.run_once().await.unwrap();

        assert_eq!(batch.published, 2);
        assert!(batch.halted_at.is_some());
        assert_eq!(source.pending(), 2);

        // The failed record is redelivered first on the next pass.
        let batch = relay.run_once().await.unwrap();
        assert_eq!(batch.published, 2);
        assert_eq!(source.pending(), 0);
        let seqs: Vec<_> = publisher.seen.lock().unwrap().iter().map(|p| p["seq"].clone()).collect();
        assert_eq!(seqs.len(), 4);
        assert_eq!(seqs[2], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let source = Arc::new(VecSource::with_records(3));
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = OutboxRelay::new(source.clone(), publisher, clock(), 10);
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let relayed = relay.run(cancel, Duration::from_millis(10)).await;
        handle.await.unwrap();

        assert_eq!(relayed, 3);
        assert_eq!(source.pending(), 0);
    }
}
