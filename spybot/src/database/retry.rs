//! Retry helpers for database writes.
//!
//! Watermark writes race with nothing but other spybot writes, yet SQLite
//! can still report `SQLITE_BUSY` while a checkpoint runs. Such writes are
//! retried with capped exponential backoff and jitter.

use rand::random;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

const BUSY_MAX_RETRIES: u32 = 8;
const BUSY_BASE_DELAY_MS: u64 = 10;
const BUSY_MAX_DELAY_MS: u64 = 1000;

fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    if let sqlx::Error::Database(db_err) = sqlx_err {
        // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
        if matches!(db_err.code().as_deref(), Some("5") | Some("6")) {
            return true;
        }
    }

    let msg = sqlx_err.to_string().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

/// Backoff before retry number `attempt` (0-based), without jitter.
fn busy_backoff(attempt: u32) -> Duration {
    let exp = BUSY_BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(BUSY_MAX_DELAY_MS))
}

pub async fn retry_on_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) && attempt < BUSY_MAX_RETRIES => {
                let base = busy_backoff(attempt);
                let jitter_ms = random::<u64>() % (base.as_millis() as u64 / 4 + 1);
                let delay = base + Duration::from_millis(jitter_ms);

                debug!(
                    "SQLite busy during {}, retrying in {:?} (attempt {}/{})",
                    op_name,
                    delay,
                    attempt + 1,
                    BUSY_MAX_RETRIES
                );

                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(busy_backoff(0), Duration::from_millis(10));
        assert_eq!(busy_backoff(3), Duration::from_millis(80));
        assert_eq!(busy_backoff(12), Duration::from_millis(BUSY_MAX_DELAY_MS));
    }

    #[test]
    fn test_non_sqlx_errors_are_not_busy() {
        assert!(!is_busy(&Error::Other("database is locked".to_string())));
    }

    #[tokio::test]
    async fn test_non_busy_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_on_busy("test", || {
            calls += 1;
            async { Err(Error::validation("nope")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
