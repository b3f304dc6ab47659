/// Connection Multiplexer
///
/// Owns one hub connection per [`Endpoint`] and the callbacks registered for
/// each endpoint's events.
///
/// Guarantees:
/// - `connect` is idempotent: concurrent callers share one in-flight attempt
/// - Callbacks live in the multiplexer, not on the transport, so they keep
///   firing (exactly once per event) across reconnects
/// - Unexpected closes are retried with exponential backoff; explicit
///   `disconnect` removes every trace of the endpoint
///
/// Construct one instance at startup and share it (it is cheap to clone).
use super::events::HubEvent;
use super::transport::{HubConnector, HubLink, HubSession, TransportEvent};
use super::ws::WebSocketConnector;
use crate::auth::{self, TokenProvider};
use crate::config::HubConfig;
use crate::endpoint::Endpoint;
use crate::error::{RealtimeError, RealtimeResult};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use resilience::{retry_with_backoff, with_timeout, BackoffPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Published whenever an endpoint changes state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateChange {
    pub endpoint: Endpoint,
    pub state: ConnectionState,
}

/// Handle returned by [`ConnectionMultiplexer::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

pub type EventCallback = Arc<dyn Fn(&HubEvent) + Send + Sync>;

type StartFuture = Shared<BoxFuture<'static, RealtimeResult<()>>>;

type SubscriptionTable = HashMap<Endpoint, HashMap<String, Vec<(SubscriptionId, EventCallback)>>>;

struct Connection {
    state: ConnectionState,
    retry_count: u32,
    pending_start: Option<StartFuture>,
    link: Option<Arc<dyn HubLink>>,
    /// Distinguishes this connection from a later one on the same endpoint
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    base_url: String,
    connector: Arc<dyn HubConnector>,
    tokens: Arc<dyn TokenProvider>,
    reconnect_policy: BackoffPolicy,
    invoke_timeout: Duration,
    connections: Mutex<HashMap<Endpoint, Connection>>,
    subscriptions: RwLock<SubscriptionTable>,
    generations: AtomicU64,
    state_tx: broadcast::Sender<ConnectionStateChange>,
}

#[derive(Clone)]
pub struct ConnectionMultiplexer {
    inner: Arc<Inner>,
}

impl ConnectionMultiplexer {
    pub fn new(
        config: &HubConfig,
        connector: Arc<dyn HubConnector>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                base_url: config.base_url.clone(),
                connector,
                tokens,
                reconnect_policy: config.reconnect.clone(),
                invoke_timeout: config.invoke_timeout,
                connections: Mutex::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                generations: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    /// Multiplexer backed by real WebSocket connections.
    pub fn websocket(config: &HubConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let connector = WebSocketConnector::new(config.invoke_timeout, config.keepalive_interval);
        Self::new(config, Arc::new(connector), tokens)
    }

    /// Open the connection for `endpoint`, or join the attempt already in flight.
    pub async fn connect(&self, endpoint: Endpoint) -> RealtimeResult<()> {
        let (start, fresh) = {
            let mut connections = self.inner.connections.lock();
            let existing = connections
                .get(&endpoint)
                .map(|c| (c.state, c.pending_start.clone()));

            match existing {
                Some((ConnectionState::Connected, _)) => return Ok(()),
                Some((ConnectionState::Reconnecting, _)) => {
                    return Err(RealtimeError::NotConnected(endpoint))
                }
                Some((_, Some(start))) => (start, false),
                _ => {
                    let token = auth::resolve(self.inner.tokens.as_ref())
                        .ok_or(RealtimeError::AuthMissing)?;
                    let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    let start = self
                        .inner
                        .clone()
                        .open(endpoint, token, generation)
                        .boxed()
                        .shared();

                    connections.insert(
                        endpoint,
                        Connection {
                            state: ConnectionState::Connecting,
                            retry_count: 0,
                            pending_start: Some(start.clone()),
                            link: None,
                            generation,
                            pump: None,
                        },
                    );
                    (start, true)
                }
            }
        };

        if fresh {
            self.inner.publish(endpoint, ConnectionState::Connecting);
        } else {
            debug!(endpoint = %endpoint, "joining in-flight hub connect");
        }

        start.await
    }

    /// Tear down `endpoint` and drop its callback wiring. No-op when not open.
    pub async fn disconnect(&self, endpoint: Endpoint) -> RealtimeResult<()> {
        let removed = self.inner.connections.lock().remove(&endpoint);
        self.inner.subscriptions.write().remove(&endpoint);

        let Some(connection) = removed else {
            debug!(endpoint = %endpoint, "disconnect on closed endpoint");
            return Ok(());
        };

        if let Some(link) = connection.link {
            link.close().await;
        }
        if let Some(pump) = connection.pump {
            pump.abort();
        }

        self.inner.publish(endpoint, ConnectionState::Disconnected);
        info!(endpoint = %endpoint, "hub disconnected");
        Ok(())
    }

    /// Disconnect every endpoint; a failure on one does not stop the others.
    pub async fn disconnect_all(&self) {
        let endpoints: Vec<Endpoint> = self.inner.connections.lock().keys().copied().collect();

        let results = join_all(endpoints.iter().map(|endpoint| self.disconnect(*endpoint))).await;
        for (endpoint, result) in endpoints.iter().zip(results) {
            if let Err(e) = result {
                warn!(endpoint = %endpoint, error = %e, "disconnect failed");
            }
        }

        self.inner.subscriptions.write().clear();
    }

    /// Register `callback` for `event` on `endpoint`.
    ///
    /// Works before the endpoint is connected; the callback starts receiving
    /// events once it is.
    pub fn on<F>(&self, endpoint: Endpoint, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner
            .subscriptions
            .write()
            .entry(endpoint)
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));

        debug!(endpoint = %endpoint, event, "subscribed");
        id
    }

    /// Remove one callback, or every callback for `event` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&self, endpoint: Endpoint, event: &str, id: Option<SubscriptionId>) -> usize {
        let mut subscriptions = self.inner.subscriptions.write();
        let Some(events) = subscriptions.get_mut(&endpoint) else {
            return 0;
        };
        let Some(callbacks) = events.get_mut(event) else {
            return 0;
        };

        let before = callbacks.len();
        match id {
            Some(id) => callbacks.retain(|(existing, _)| *existing != id),
            None => callbacks.clear(),
        }
        let removed = before - callbacks.len();

        if callbacks.is_empty() {
            events.remove(event);
        }
        if events.is_empty() {
            subscriptions.remove(&endpoint);
        }
        removed
    }

    /// Invoke a server method, connecting lazily if needed.
    pub async fn invoke(
        &self,
        endpoint: Endpoint,
        method: &str,
        arguments: Vec<Value>,
    ) -> RealtimeResult<Value> {
        let link = match self.live_link(endpoint) {
            Some(link) => link,
            None => {
                if let Err(e) = self.connect(endpoint).await {
                    debug!(endpoint = %endpoint, method, error = %e, "lazy connect before invoke failed");
                    return Err(RealtimeError::NotConnected(endpoint));
                }
                self.live_link(endpoint)
                    .ok_or(RealtimeError::NotConnected(endpoint))?
            }
        };

        debug!(endpoint = %endpoint, method, "invoking hub method");
        let operation = format!("{endpoint} {method}");
        with_timeout(&operation, self.inner.invoke_timeout, link.invoke(method, arguments)).await?
    }

    /// [`invoke`](Self::invoke) and deserialize the completion result.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        method: &str,
        arguments: Vec<Value>,
    ) -> RealtimeResult<T> {
        let value = self.invoke(endpoint, method, arguments).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn state(&self, endpoint: Endpoint) -> ConnectionState {
        self.inner
            .connections
            .lock()
            .get(&endpoint)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self, endpoint: Endpoint) -> bool {
        self.state(endpoint) == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last drop (0 when healthy).
    pub fn retry_count(&self, endpoint: Endpoint) -> u32 {
        self.inner
            .connections
            .lock()
            .get(&endpoint)
            .map(|c| c.retry_count)
            .unwrap_or(0)
    }

    /// Endpoints with any connection state other than `Disconnected`.
    pub fn open_endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.inner.connections.lock().keys().copied().collect();
        endpoints.sort();
        endpoints
    }

    pub fn subscriber_count(&self, endpoint: Endpoint, event: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .get(&endpoint)
            .and_then(|events| events.get(event))
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }

    /// Stream of connection state changes, for connectivity indicators.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionStateChange> {
        self.inner.state_tx.subscribe()
    }

    fn live_link(&self, endpoint: Endpoint) -> Option<Arc<dyn HubLink>> {
        self.inner
            .connections
            .lock()
            .get(&endpoint)
            .filter(|c| c.state == ConnectionState::Connected)
            .and_then(|c| c.link.clone())
    }
}

impl Inner {
    fn publish(&self, endpoint: Endpoint, state: ConnectionState) {
        // No receivers is fine
        let _ = self.state_tx.send(ConnectionStateChange { endpoint, state });
    }

    async fn dial(&self, url: &str, token: &str) -> RealtimeResult<HubSession> {
        let outcome = with_timeout("hub connect", self.invoke_timeout, self.connector.connect(url, token))
            .await
            .map_err(RealtimeError::from)
            .and_then(|result| result);

        outcome.map_err(|e| match e {
            RealtimeError::Transport(_) | RealtimeError::Timeout(_) | RealtimeError::AuthMissing => e,
            other => RealtimeError::Transport(other.to_string()),
        })
    }

    async fn open(self: Arc<Self>, endpoint: Endpoint, token: String, generation: u64) -> RealtimeResult<()> {
        let url = endpoint.url(&self.base_url);
        info!(endpoint = %endpoint, url = %url, "connecting to hub");

        let HubSession { link, events } = match self.dial(&url, &token).await {
            Ok(session) => session,
            Err(e) => {
                let removed = {
                    let mut connections = self.connections.lock();
                    let current = connections.get(&endpoint).map(|c| c.generation) == Some(generation);
                    if current {
                        connections.remove(&endpoint);
                    }
                    current
                };
                if removed {
                    self.publish(endpoint, ConnectionState::Disconnected);
                }
                warn!(endpoint = %endpoint, error = %e, "hub connect failed");
                return Err(match e {
                    RealtimeError::Transport(_) => e,
                    other => RealtimeError::Transport(other.to_string()),
                });
            }
        };

        let attached = {
            let mut connections = self.connections.lock();
            match connections.get_mut(&endpoint) {
                Some(conn) if conn.generation == generation => {
                    conn.state = ConnectionState::Connected;
                    conn.retry_count = 0;
                    conn.pending_start = None;
                    conn.link = Some(link.clone());
                    conn.pump = Some(tokio::spawn(self.clone().pump(endpoint, generation, events)));
                    true
                }
                _ => false,
            }
        };

        if !attached {
            // Disconnected while the attempt was in flight
            link.close().await;
            return Err(RealtimeError::NotConnected(endpoint));
        }

        self.publish(endpoint, ConnectionState::Connected);
        info!(endpoint = %endpoint, "hub connected");
        Ok(())
    }

    /// Per-connection task: dispatches inbound events in arrival order and
    /// drives reconnection when the transport drops.
    async fn pump(
        self: Arc<Self>,
        endpoint: Endpoint,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            let close_error = loop {
                match events.recv().await {
                    Some(TransportEvent::Invocation { target, arguments }) => {
                        self.dispatch(endpoint, &target, arguments)
                    }
                    Some(TransportEvent::Closed { error }) => break error,
                    None => break None,
                }
            };

            if !self.begin_reconnect(endpoint, generation) {
                debug!(endpoint = %endpoint, "event pump stopped");
                return;
            }
            warn!(endpoint = %endpoint, error = ?close_error, "hub connection dropped, reconnecting");

            match self.reconnect(endpoint, generation).await {
                Some(next) => events = next,
                None => return,
            }
        }
    }

    fn dispatch(&self, endpoint: Endpoint, target: &str, arguments: Vec<Value>) {
        let callbacks: Vec<EventCallback> = self
            .subscriptions
            .read()
            .get(&endpoint)
            .and_then(|events| events.get(target))
            .map(|callbacks| callbacks.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        if callbacks.is_empty() {
            debug!(endpoint = %endpoint, target, "no subscribers for hub event");
            return;
        }

        let event = match HubEvent::decode(target, arguments) {
            Ok(event) => event,
            Err(e) => {
                warn!(endpoint = %endpoint, target, error = %e, "dropping undecodable hub event");
                return;
            }
        };

        for callback in callbacks {
            callback(&event);
        }
    }

    fn begin_reconnect(&self, endpoint: Endpoint, generation: u64) -> bool {
        let started = {
            let mut connections = self.connections.lock();
            match connections.get_mut(&endpoint) {
                Some(conn)
                    if conn.generation == generation && conn.state == ConnectionState::Connected =>
                {
                    conn.state = ConnectionState::Reconnecting;
                    conn.retry_count = 0;
                    conn.link = None;
                    true
                }
                _ => false,
            }
        };
        if started {
            self.publish(endpoint, ConnectionState::Reconnecting);
        }
        started
    }

    fn record_attempt(&self, endpoint: Endpoint, generation: u64, attempt: u32) -> bool {
        let mut connections = self.connections.lock();
        match connections.get_mut(&endpoint) {
            Some(conn)
                if conn.generation == generation && conn.state == ConnectionState::Reconnecting =>
            {
                conn.retry_count = attempt;
                true
            }
            _ => false,
        }
    }

    async fn reconnect(
        self: &Arc<Self>,
        endpoint: Endpoint,
        generation: u64,
    ) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        let url = endpoint.url(&self.base_url);

        let outcome = retry_with_backoff(
            &self.reconnect_policy,
            |attempt| {
                let inner = self.clone();
                let url = url.clone();
                async move {
                    if !inner.record_attempt(endpoint, generation, attempt + 1) {
                        return Err(RealtimeError::NotConnected(endpoint));
                    }
                    info!(endpoint = %endpoint, attempt = attempt + 1, "reconnecting to hub");
                    let token =
                        auth::resolve(inner.tokens.as_ref()).ok_or(RealtimeError::AuthMissing)?;
                    inner.dial(&url, &token).await
                }
            },
            RealtimeError::is_retryable,
        )
        .await;

        match outcome {
            Ok(HubSession { link, events }) => {
                let attached = {
                    let mut connections = self.connections.lock();
                    match connections.get_mut(&endpoint) {
                        Some(conn)
                            if conn.generation == generation
                                && conn.state == ConnectionState::Reconnecting =>
                        {
                            conn.state = ConnectionState::Connected;
                            conn.retry_count = 0;
                            conn.link = Some(link.clone());
                            true
                        }
                        _ => false,
                    }
                };

                if attached {
                    self.publish(endpoint, ConnectionState::Connected);
                    info!(endpoint = %endpoint, "hub reconnected, subscriptions re-attached");
                    Some(events)
                } else {
                    link.close().await;
                    None
                }
            }
            Err(e) => {
                let removed = {
                    let mut connections = self.connections.lock();
                    let current = connections.get(&endpoint).map(|c| c.generation) == Some(generation);
                    if current {
                        connections.remove(&endpoint);
                    }
                    current
                };
                if removed {
                    self.publish(endpoint, ConnectionState::Disconnected);
                    error!(endpoint = %endpoint, error = %e, "giving up on hub reconnect");
                }
                None
            }
        }
    }
}
