//! Re-running statements that lost a transaction conflict.

use std::future::Future;
use std::time::Duration;

use crate::DbError;

/// Attempts before a conflict is reported to the caller.
pub(crate) const MAX_ATTEMPTS: u32 = 32;

/// Pause before the next attempt; grows with each conflict.
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt.min(10)))
}

/// Run `op` until it succeeds, fails for another reason, or has lost
/// [`MAX_ATTEMPTS`] conflicts in a row.
///
/// `op` must be safe to repeat: a conflicting statement is rolled back, so
/// each attempt starts from the committed state.
pub(crate) async fn on_conflict<T, F, Fut>(what: &str, mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::debug!("{} hit a write conflict (attempt {}), retrying", what, attempt);
                tokio::time::sleep(backoff(attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> DbError {
        DbError::Conflict("read or write conflict".into())
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let calls = &AtomicU32::new(0);
        let result = on_conflict("test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(conflict())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), DbError> = on_conflict("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Query("syntax".into()))
        })
        .await;

        assert!(matches!(result, Err(DbError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn endless_conflicts_give_up() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), DbError> = on_conflict("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(result.as_ref().err().is_some_and(|e| e.is_retryable()));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
