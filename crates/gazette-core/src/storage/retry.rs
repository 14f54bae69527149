//! Bounded retry for transient SQLite failures.
//!
//! Lock contention between the ingestion batch and concurrent readers, or a
//! short I/O hiccup, surfaces as a busy/locked/ioerr code. Those are retried a
//! few times with exponential backoff; everything else (including uniqueness
//! violations) is returned immediately.

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts after the first try
pub const MAX_RETRIES: u32 = 3;

const BASE_DELAY_MS: u64 = 100;

/// Check if a SQLite error is transient and worth retrying
///
/// Covers SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_BUSY_SNAPSHOT (517),
/// and the SQLITE_IOERR family (base code 10).
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .map(is_transient_code)
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn is_transient_code(code: i32) -> bool {
    // Extended result codes carry the primary code in the low byte
    matches!(code & 0xff, 5 | 6 | 10)
}

/// Delays: 100ms, 200ms, 400ms
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run a database operation, retrying transient failures with backoff
pub async fn query_with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay.as_millis(),
                    "Transient database error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_transient_codes() {
        assert!(is_transient_code(5));
        assert!(is_transient_code(517));
        assert!(is_transient_code(266));
        // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_transient_code(2067));
        assert!(!is_transient_code(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_pool_timeouts_then_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: std::result::Result<(), sqlx::Error> = query_with_retry(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(sqlx::Error::PoolTimedOut)
        })
        .await;

        assert!(matches!(result, Err(sqlx::Error::PoolTimedOut)));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: std::result::Result<(), sqlx::Error> = query_with_retry(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(sqlx::Error::RowNotFound)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
