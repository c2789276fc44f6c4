//! Bounded exponential backoff with jitter (spec.md §5): shared by
//! `EmbeddingClient` and `VectorStore` so the retry policy for recoverable
//! failures (timeouts, rate limits) lives in exactly one place.

use std::time::Duration;

use rand::Rng;

use crate::error::{IndexError, Recoverability};

pub const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 500;
const FACTOR: u64 = 2;
const JITTER_FRACTION: f64 = 0.2;

fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_DELAY_MS.saturating_mul(FACTOR.saturating_pow(attempt));
    let jitter_span = (base as f64 * JITTER_FRACTION) as i64;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    let millis = (base as i64 + jitter).max(0) as u64;
    Duration::from_millis(millis)
}

/// Run `op` up to `MAX_RETRIES + 1` times, sleeping with jittered
/// exponential backoff between attempts, as long as the returned error is
/// recoverable. Non-recoverable and `Cancelled` errors return immediately.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, IndexError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, IndexError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_recoverable(&e) && attempt < MAX_RETRIES => {
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_recoverable(e: &IndexError) -> bool {
    matches!(
        e,
        IndexError::Embedding { recoverability: Recoverability::Recoverable, .. }
            | IndexError::VectorStore { recoverability: Recoverability::Recoverable, .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_recoverable_failures_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(IndexError::VectorStore {
                        message: "timeout".into(),
                        recoverability: Recoverability::Recoverable,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_recoverable_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), IndexError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(IndexError::SchemaMismatch { expected: 1536, got: 768 })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), IndexError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(IndexError::Embedding {
                    message: "rate limited".into(),
                    recoverability: Recoverability::Recoverable,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }
}
