pub mod auth;
pub mod channels;
pub mod chat;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod hub;
pub mod logging;
pub mod notifications;
pub mod rest;
pub mod state;
pub mod timestamp;

pub use endpoint::Endpoint;
pub use error::{RealtimeError, RealtimeResult};
