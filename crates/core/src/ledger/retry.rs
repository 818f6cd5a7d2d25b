//! Bounded caller-side retry for optimistic lock conflicts.

use std::future::Future;

use tracing::warn;

use super::error::LedgerError;

/// Runs `op`, re-running it while it fails with a retryable error, at most
/// `max_attempts` times in total.
///
/// `op` must reload whatever state it mutates on every call; retrying a write
/// built from stale state would conflict again.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %err, "retrying after conflict");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use uuid::Uuid;

    use super::*;

    fn conflict() -> LedgerError {
        LedgerError::OptimisticLock {
            aggregate_id: Uuid::nil(),
            expected: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(3, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_on_conflict(2, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(matches!(result, Err(LedgerError::OptimisticLock { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_on_conflict(5, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::NotFound("entry".into()))
        })
        .await;

        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
