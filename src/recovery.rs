//! Generic retry/backoff helpers used when calling upstream catalog providers.

use crate::error::{AppError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Configuration for retry policies
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff. Used for the rare upstream
/// calls (e.g. activity-store writes) where a transient failure is worth one or two
/// quick retries before surfacing to the caller.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                last_error = Some(err);

                if attempt < config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %last_error.as_ref().unwrap(),
                        "operation failed, retrying"
                    );

                    sleep(delay).await;
                    delay = std::cmp::min(
                        Duration::from_millis((delay.as_millis() as f64 * config.backoff_multiplier) as u64),
                        config.max_delay,
                    );
                } else {
                    error!(
                        operation = operation_name,
                        attempt,
                        error = %last_error.as_ref().unwrap(),
                        "operation failed after all retry attempts"
                    );
                }
            }
        }
    }

    Err(last_error.unwrap_or(AppError::Internal(anyhow::anyhow!("retry loop produced no error"))))
}

/// Run a fallible operation, logging and substituting a fallback value on failure.
/// Used for the non-mandatory pieces of a request (e.g. a single seed-query fan-out
/// in the recommendation generator) that must not abort the whole pipeline.
pub async fn with_graceful_degradation<F, Fut, T>(operation: F, fallback_value: T, feature_name: &str) -> T
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match operation().await {
        Ok(result) => result,
        Err(err) => {
            warn!(feature = feature_name, error = %err, "feature failed, using fallback value");
            fallback_value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result = retry_with_backoff(
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(AppError::Store("transient".to_string()))
                    } else {
                        Ok("success")
                    }
                }
            },
            config,
            "test_operation",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result: Result<&str> = retry_with_backoff(
            || async { Err(AppError::Store("permanent".to_string())) },
            config,
            "test_operation",
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_graceful_degradation_falls_back() {
        let value = with_graceful_degradation(
            || async { Err::<i32, _>(AppError::Store("boom".to_string())) },
            -1,
            "test_feature",
        )
        .await;
        assert_eq!(value, -1);
    }
}
