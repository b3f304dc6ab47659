//! Bearer-token resolution.
//!
//! Token acquisition (login, refresh) lives elsewhere; this layer only asks
//! for the current token at connect time.

use std::sync::Arc;

/// Token factory consulted every time a connection is opened or re-opened.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// A fixed token, e.g. read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(token))
        }
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Resolve a non-empty token from `provider`.
pub(crate) fn resolve(provider: &dyn TokenProvider) -> Option<String> {
    provider
        .access_token()
        .filter(|token| !token.trim().is_empty())
}
