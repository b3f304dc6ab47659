/// Retry loop driven by a [`BackoffPolicy`]
use crate::backoff::BackoffPolicy;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    #[error("permanent failure: {0}")]
    Permanent(E),
    #[error("retry policy allows no attempts")]
    NoAttempts,
}

impl<E> RetryError<E> {
    /// The error reported by the final attempt, if any attempt ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Permanent(e) => Some(e),
            RetryError::NoAttempts => None,
        }
    }
}

/// Run `op` until it succeeds, sleeping the policy delay before every attempt.
///
/// The first attempt also waits `initial_delay`: this loop starts after
/// something already failed. `op` receives the zero-based attempt number.
/// Errors for which `retryable` returns `false` stop the loop immediately.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    policy: &BackoffPolicy,
    mut op: F,
    retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut schedule = policy.schedule();
    let mut last_error: Option<E> = None;

    while let Some(delay) = schedule.next() {
        let attempt = schedule.attempt() - 1;
        debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "waiting before retry");
        tokio::time::sleep(delay).await;

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !retryable(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "retry attempt failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last_error) => Err(RetryError::Exhausted {
            attempts: schedule.attempt(),
            last_error,
        }),
        None => Err(RetryError::NoAttempts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            &fast_policy(3),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(42) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let result = retry_with_backoff(
            &fast_policy(5),
            |attempt| async move {
                if attempt < 2 {
                    Err("socket closed")
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            &fast_policy(3),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("connection refused") }
            },
            |_| true,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            &fast_policy(5),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("no token") }
            },
            |e| *e != "no token",
        )
        .await;

        assert!(matches!(result, Err(RetryError::Permanent("no token"))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempt_policy() {
        let result =
            retry_with_backoff(&fast_policy(0), |_| async { Ok::<_, String>(()) }, |_| true).await;
        assert!(matches!(result, Err(RetryError::NoAttempts)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_before_every_attempt() {
        let policy = BackoffPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();

        let _ = retry_with_backoff(&policy, |_| async { Err::<(), _>("down") }, |_| true).await;

        // 1s + 2s + 4s
        assert!(start.elapsed() >= Duration::from_secs(7));
    }
}
