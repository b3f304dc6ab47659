use std::env;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "info,rental_realtime=debug,tungstenite=warn";

/// Console output shape, picked with `RENTAL_LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Text,
    /// JSON lines, for log shippers
    Json,
}

impl LogFormat {
    /// Unrecognized values fall back to text.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") | Some("jsonl") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let format = LogFormat::parse(env::var("RENTAL_LOG_FORMAT").ok().as_deref());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = fmt().with_env_filter(env_filter);
    match format {
        LogFormat::Json => builder.json().with_current_span(false).init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}
