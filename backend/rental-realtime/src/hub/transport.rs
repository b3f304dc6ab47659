/// Seam between the multiplexer and the socket implementation
use crate::error::RealtimeResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a live transport reports back to the multiplexer
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Server-initiated invocation, in arrival order
    Invocation { target: String, arguments: Vec<Value> },
    /// The transport is gone; `error` is set for abnormal closes
    Closed { error: Option<String> },
}

/// An opened transport: the outbound handle plus its inbound event stream.
pub struct HubSession {
    pub link: Arc<dyn HubLink>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(&self, url: &str, access_token: &str) -> RealtimeResult<HubSession>;
}

/// Outbound half of an open transport.
#[async_trait]
pub trait HubLink: Send + Sync {
    /// Invoke a server method and wait for its completion record.
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> RealtimeResult<Value>;

    /// Close the transport. No `Closed` event is required afterwards.
    async fn close(&self);
}
