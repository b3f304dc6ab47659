use crate::endpoint::Endpoint;
use resilience::TimeoutError;
use std::time::Duration;
use thiserror::Error;

pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors raised by the connection, channel, notification and chat layers.
///
/// `Clone` so a single in-flight connect outcome can be handed to every
/// caller awaiting it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RealtimeError {
    #[error("no access token available")]
    AuthMissing,

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected to {0}")]
    NotConnected(Endpoint),

    #[error("registration on {endpoint} failed: {reason}")]
    RegistrationFailed { endpoint: Endpoint, reason: String },

    #[error("application error: {0}")]
    Application(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RealtimeError {
    /// Transport-level failures are worth another attempt; everything else is
    /// surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RealtimeError::Transport(_) | RealtimeError::Timeout(_))
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(e: std::io::Error) -> Self {
        RealtimeError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            RealtimeError::Transport(e.to_string())
        } else if e.is_decode() {
            RealtimeError::Decode(e.to_string())
        } else {
            RealtimeError::Application(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(e.to_string())
    }
}

impl From<TimeoutError> for RealtimeError {
    fn from(e: TimeoutError) -> Self {
        match e {
            TimeoutError::Elapsed { after, .. } => RealtimeError::Timeout(after),
            TimeoutError::OperationFailed { reason, .. } => RealtimeError::Transport(reason),
        }
    }
}
