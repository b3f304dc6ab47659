/// Resilience primitives for long-lived client connections
///
/// This library provides:
/// - **Backoff**: Exponential reconnect schedule with a cap and optional jitter
/// - **Retry**: A retry loop that sleeps the backoff delay before each attempt
/// - **Timeout**: Labelled deadlines for remote calls
/// - **Preset Configurations**: Policies for push hubs and REST calls
///
/// # Example: Reconnect a dropped channel
///
/// ```rust,no_run
/// use resilience::{presets, retry_with_backoff};
///
/// #[tokio::main]
/// async fn main() {
///     let policy = presets::push_hub_config().reconnect.unwrap_or_default();
///
///     let result = retry_with_backoff(
///         &policy,
///         |_attempt| async {
///             // Re-open the socket here
///             Ok::<_, String>(())
///         },
///         |_err| true,
///     )
///     .await;
/// }
/// ```

pub mod backoff;
pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use backoff::{Backoff, BackoffPolicy};
pub use presets::{push_hub_config, rest_api_config, ServiceConfig};
pub use retry::{retry_with_backoff, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
