/// Preset policies for the two kinds of remote dependency a client has
use crate::backoff::BackoffPolicy;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a remote dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    /// Reconnect policy; `None` means failures surface to the caller untouched
    pub reconnect: Option<BackoffPolicy>,
}

/// Persistent push hubs
///
/// - Timeout: 30s per connect / invoke
/// - Reconnect: 1s doubling to 30s, 10 attempts
pub fn push_hub_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        reconnect: Some(BackoffPolicy::default()),
    }
}

/// REST collaborator
///
/// - Timeout: 15s
/// - No automatic retry (application errors are left to the user)
pub fn rest_api_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        reconnect: None,
    }
}
