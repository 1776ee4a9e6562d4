//! Retry logic with exponential backoff for a single mirror

use crate::config::DownloaderConfig;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use repofetch_core::Failure;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry a fallible async operation with exponential backoff.
///
/// Only transient failures are retried. The final failure is returned
/// unchanged so its classification survives.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &DownloaderConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, Failure>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Failure>>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if attempts >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "Operation failed after maximum retries"
                    );
                    return Err(err);
                }

                let Some(duration) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    operation = operation_name,
                    attempts = attempts,
                    error = %err,
                    retry_in_ms = duration.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(duration).await;
            }
        }
    }
}

/// Create exponential backoff from config
fn create_backoff(config: &DownloaderConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(config.max_backoff_ms))
        .with_multiplier(config.backoff_multiplier)
        .with_max_elapsed_time(None) // max_attempts bounds the loop
        .build()
}

/// Interruptions end the attempt; everything else transient is worth another try.
fn is_retryable(err: &Failure) -> bool {
    err.is_transient() && !err.is_interrupted()
}
