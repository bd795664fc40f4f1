//! Bounded retry with linear or exponential backoff.

use std::time::Duration;
use tokio::time::sleep;

use crate::error::ScrapeError;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `step * attempt`
    Linear(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let secs = initial.as_secs_f64() * multiplier.powf(attempt as f64 - 1.0);
                Duration::from_secs_f64(secs.min(max.as_secs_f64()))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                multiplier: 2.0,
                max: Duration::from_secs(30),
            },
        }
    }
}

impl RetryConfig {
    /// `attempts` tries with a linear backoff step
    pub fn linear(attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: attempts.max(1),
            backoff: Backoff::Linear(step),
        }
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded
    Success(T),
    /// Operation kept failing with retryable errors until attempts ran out
    TransientFailure(ScrapeError, u32),
    /// Operation failed with a terminal error
    PermanentFailure(ScrapeError),
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, ScrapeError> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::TransientFailure(err, _) | RetryResult::PermanentFailure(err) => Err(err),
        }
    }
}

/// Execute an async operation with retry logic that returns RetryResult
pub async fn with_retry_detailed<T, F, Fut>(config: RetryConfig, operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ScrapeError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return RetryResult::Success(result);
            }
            Err(error) if error.is_retryable() => {
                if attempts >= config.max_attempts {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return RetryResult::TransientFailure(error, attempts);
                }

                let delay = config.backoff.delay(attempts);
                tracing::debug!(
                    "Transient error on attempt {}: {}, retrying in {:?}",
                    attempts,
                    error,
                    delay
                );
                sleep(delay).await;
            }
            Err(error) => return RetryResult::PermanentFailure(error),
        }
    }
}

/// Execute an async operation with retry logic
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ScrapeError>>,
{
    with_retry_detailed(config, operation).await.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_config(attempts: u32) -> RetryConfig {
        RetryConfig::linear(attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(2), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_timeout() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(2), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    if *call_count.borrow() < 2 {
                        Err(ScrapeError::NavigationTimeout("slow".to_string()))
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted_is_transient_failure() {
        let outcome: RetryResult<()> = with_retry_detailed(fast_config(2), || async {
            Err(ScrapeError::ExtractionFailed("no meta".to_string()))
        })
        .await;

        match outcome {
            RetryResult::TransientFailure(ScrapeError::ExtractionFailed(_), attempts) => {
                assert_eq!(attempts, 2)
            }
            other => panic!("Expected transient failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, ScrapeError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(5), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(ScrapeError::Blocked)
                }
            })
        }
        .await;

        assert!(matches!(result, Err(ScrapeError::Blocked)));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn test_backoff_delays() {
        let linear = Backoff::Linear(Duration::from_millis(1500));
        assert_eq!(linear.delay(1), Duration::from_millis(1500));
        assert_eq!(linear.delay(2), Duration::from_millis(3000));

        let exp = Backoff::Exponential {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(5),
        };
        assert_eq!(exp.delay(1), Duration::from_secs(1));
        assert_eq!(exp.delay(3), Duration::from_secs(4));
        assert_eq!(exp.delay(4), Duration::from_secs(5));
    }
}
