/// Deadlines for hub invocations and REST calls
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TimeoutError {
    #[error("{operation} timed out after {after:?}")]
    Elapsed { operation: String, after: Duration },
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },
}

impl TimeoutError {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed { .. })
    }
}

/// Run `future` under a deadline; `operation` labels the error.
pub async fn with_timeout<F, T>(
    operation: &str,
    duration: Duration,
    future: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed {
            operation: operation.to_string(),
            after: duration,
        })
}

/// Like [`with_timeout`] for fallible futures, flattening the inner error.
pub async fn with_timeout_result<F, T, E>(
    operation: &str,
    duration: Duration,
    future: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::OperationFailed {
            operation: operation.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(TimeoutError::Elapsed {
            operation: operation.to_string(),
            after: duration,
        }),
    }
}
