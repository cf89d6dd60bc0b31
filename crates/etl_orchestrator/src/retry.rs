//! Bounded exponential backoff for the bulk-load phase only (spec.md §7):
//! the source and transform phases never retry, since replaying them after
//! a partial failure could duplicate side effects a source can't undo.

use etl_db::DbError;
use etl_protocol::RetryPolicy;
use rand::Rng;
use std::future::Future;
use tracing::warn;

/// Run `op` up to `policy.max_attempts` times, retrying only when the
/// returned error is `DbError::Sqlx` wrapping a transient condition (the
/// loader itself does not distinguish transient from fatal database errors,
/// so every `Sqlx` error is treated as retryable and non-`Sqlx` errors —
/// `NoColumnsMatch`, `LoadFailed`, etc — fail immediately).
pub async fn run_with_retry<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.base_delay_ms(attempt) + jitter_ms(policy.max_jitter_ms);
                warn!(attempt, delay_ms = delay, error = %err, "retrying bulk load after transient error");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_retryable(err: &DbError) -> bool {
    matches!(err, DbError::Sqlx(_))
}

fn jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let policy = RetryPolicy { max_attempts: 3, initial_delay_ms: 1, factor: 2.0, max_jitter_ms: 0 };
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = run_with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_sqlx_errors_are_not_retried() {
        let policy = RetryPolicy { max_attempts: 3, initial_delay_ms: 1, factor: 2.0, max_jitter_ms: 0 };
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = run_with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::load_failed("not retryable")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
