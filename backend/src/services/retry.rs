//! Whole-call retry for operations that lost a race

use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Run `op`, running it again from scratch while it fails with a retryable
/// error, at most `max_retries` extra times. The wait grows linearly with the
/// attempt number.
pub async fn retry_on_conflict<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(attempt, max_retries, error = %err, "retrying after conflict");
                tokio::time::sleep(backoff * attempt).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(3, Duration::ZERO, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::Conflict("bucket busy".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_on_conflict(2, Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Conflict("bucket busy".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_on_conflict(5, Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::InvalidState("already CONFIRMED".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
