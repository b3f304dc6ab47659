//! Push hub connectivity: wire protocol, transports, typed events and the
//! per-endpoint connection multiplexer.

pub mod events;
pub mod multiplexer;
pub mod protocol;
pub mod transport;
pub mod ws;

pub use events::{names, HubEvent, IncomingMessage, NotificationScope, PushNotification};
pub use multiplexer::{
    ConnectionMultiplexer, ConnectionState, ConnectionStateChange, EventCallback, SubscriptionId,
};
pub use transport::{HubConnector, HubLink, HubSession, TransportEvent};
pub use ws::WebSocketConnector;
