use crate::error::RealtimeError;
use dotenvy::dotenv;
use resilience::{presets, BackoffPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Push hub settings shared by every endpoint
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub base_url: String,
    pub reconnect: BackoffPolicy,
    pub invoke_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        let preset = presets::push_hub_config();
        Self {
            base_url: "http://localhost:5000".to_string(),
            reconnect: preset.reconnect.unwrap_or_default(),
            invoke_timeout: preset.timeout.duration,
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout: presets::rest_api_config().timeout.duration,
        }
    }
}

/// Where notification history is kept between runs
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub storage_dir: PathBuf,
    pub history_limit: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".rental"),
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub hub: HubConfig,
    pub api: ApiConfig,
    pub notifications: NotificationConfig,
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let hub_base_url = lookup("RENTAL_HUB_BASE_URL").unwrap_or(defaults.hub.base_url);
        let api_base_url = lookup("RENTAL_API_BASE_URL")
            .unwrap_or_else(|| format!("{}/api", hub_base_url.trim_end_matches('/')));

        let initial_ms: u64 = parse_or(&lookup, "HUB_RECONNECT_INITIAL_MS", 1000)?;
        let max_ms: u64 = parse_or(&lookup, "HUB_RECONNECT_MAX_MS", 30_000)?;
        if initial_ms == 0 || max_ms < initial_ms {
            return Err(RealtimeError::Config(format!(
                "HUB_RECONNECT_MAX_MS ({max_ms}) must be >= HUB_RECONNECT_INITIAL_MS ({initial_ms}) > 0"
            )));
        }
        let max_attempts: u32 = parse_or(&lookup, "HUB_RECONNECT_MAX_ATTEMPTS", 10)?;

        let reconnect = BackoffPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            ..defaults.hub.reconnect
        };

        let invoke_timeout_secs: u64 = parse_or(
            &lookup,
            "HUB_INVOKE_TIMEOUT_SECS",
            defaults.hub.invoke_timeout.as_secs(),
        )?;
        let keepalive_secs: u64 = parse_or(&lookup, "HUB_KEEPALIVE_SECS", 15)?;

        let history_limit: usize = parse_or(&lookup, "RENTAL_NOTIFICATION_LIMIT", 50)?;
        if history_limit == 0 {
            return Err(RealtimeError::Config(
                "RENTAL_NOTIFICATION_LIMIT must be positive".into(),
            ));
        }

        Ok(Self {
            hub: HubConfig {
                base_url: hub_base_url,
                reconnect,
                invoke_timeout: Duration::from_secs(invoke_timeout_secs),
                keepalive_interval: Duration::from_secs(keepalive_secs),
            },
            api: ApiConfig {
                base_url: api_base_url,
                request_timeout: defaults.api.request_timeout,
            },
            notifications: NotificationConfig {
                storage_dir: lookup("RENTAL_NOTIFICATION_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.notifications.storage_dir),
                history_limit,
            },
            access_token: lookup("RENTAL_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RealtimeError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RealtimeError::Config(format!("{key}: cannot parse {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.hub.base_url, "http://localhost:5000");
        assert_eq!(config.api.base_url, "http://localhost:5000/api");
        assert_eq!(config.hub.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.hub.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.hub.reconnect.max_attempts, Some(10));
        assert_eq!(config.notifications.history_limit, 50);
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_api_url_follows_hub_url() {
        let config =
            Config::from_lookup(lookup_from(&[("RENTAL_HUB_BASE_URL", "https://rent.io/")]))
                .unwrap();
        assert_eq!(config.api.base_url, "https://rent.io/api");
    }

    #[test]
    fn test_zero_attempts_means_unbounded() {
        let config =
            Config::from_lookup(lookup_from(&[("HUB_RECONNECT_MAX_ATTEMPTS", "0")])).unwrap();
        assert_eq!(config.hub.reconnect.max_attempts, None);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = Config::from_lookup(lookup_from(&[("HUB_INVOKE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
    }

    #[test]
    fn test_inverted_backoff_bounds_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("HUB_RECONNECT_INITIAL_MS", "5000"),
            ("HUB_RECONNECT_MAX_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
    }
}
