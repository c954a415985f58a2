use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::error::{PipelineError, PipelineResult};

/// Retry an operation with exponential backoff and jitter.
/// Non-retryable errors abort immediately.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_attempts: usize) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = PipelineResult<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_attempts);

    RetryIf::spawn(retry_strategy, operation, |e: &PipelineError| {
        let retryable = e.is_retryable();
        if retryable {
            tracing::warn!("Retryable error: {}", e);
        } else {
            tracing::error!("Non-retryable error: {}", e);
        }
        retryable
    })
    .await
}
