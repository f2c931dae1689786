//! Exponential backoff with jitter for transient I/O (spec §7).

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(200);

/// Retry `operation` up to `MAX_ATTEMPTS` times, but only when it returns a
/// [`CoreError::Transient`]. Any other error (including a non-zero exit
/// code, which is data, not an error) is returned immediately.
pub async fn with_backoff<T, F, Fut>(mut operation: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                let backoff = BASE_DELAY * 2u32.pow(attempt - 1);
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4 + 1);
                tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_backoff(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CoreError::transient("connection refused"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result: CoreResult<()> = with_backoff(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::NotFound("pod".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: CoreResult<()> = with_backoff(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::transient("still down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
