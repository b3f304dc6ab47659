//! Shared fakes for integration tests: a scripted in-memory hub connector
//! and an in-memory REST chat backend.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rental_realtime::config::HubConfig;
use rental_realtime::error::{RealtimeError, RealtimeResult};
use rental_realtime::hub::{HubConnector, HubLink, HubSession, TransportEvent};
use rental_realtime::rest::{ApiResponse, ChatApi, ChatMessageDto, ChatSessionDto};
use rental_realtime::Endpoint;
use resilience::BackoffPolicy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const BASE_URL: &str = "http://hub.test";

/// Hub settings with millisecond backoff so reconnect tests stay fast.
/// `max_attempts` of 0 reconnects forever.
pub fn hub_config(max_attempts: u32) -> HubConfig {
    HubConfig {
        base_url: BASE_URL.to_string(),
        reconnect: BackoffPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            jitter: false,
        },
        invoke_timeout: Duration::from_secs(2),
        keepalive_interval: Duration::from_secs(15),
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `future` with a two second cap.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("operation did not finish in time")
}

#[derive(Default)]
struct HubShared {
    live: Mutex<HashMap<String, mpsc::UnboundedSender<TransportEvent>>>,
    connects: Mutex<HashMap<String, usize>>,
    invocations: Mutex<Vec<(String, String, Vec<Value>)>>,
    failing_methods: Mutex<HashSet<String>>,
    refuse: AtomicBool,
    connect_delay: Mutex<Duration>,
}

/// In-memory hub server. Every `connect` opens a fresh scripted transport.
#[derive(Clone, Default)]
pub struct FakeHub {
    shared: Arc<HubShared>,
}

impl FakeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(delay: Duration) -> Self {
        let hub = Self::new();
        *hub.shared.connect_delay.lock() = delay;
        hub
    }

    pub fn connector(&self) -> Arc<dyn HubConnector> {
        Arc::new(self.clone())
    }

    /// Transports opened (or attempted) for `endpoint`.
    pub fn connects(&self, endpoint: Endpoint) -> usize {
        self.shared
            .connects
            .lock()
            .get(&endpoint.url(BASE_URL))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_live(&self, endpoint: Endpoint) -> bool {
        self.shared.live.lock().contains_key(&endpoint.url(BASE_URL))
    }

    /// Push a server invocation to the live transport of `endpoint`.
    pub fn emit(&self, endpoint: Endpoint, target: &str, arguments: Vec<Value>) -> bool {
        match self.shared.live.lock().get(&endpoint.url(BASE_URL)) {
            Some(tx) => tx
                .send(TransportEvent::Invocation {
                    target: target.to_string(),
                    arguments,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Simulate an abnormal close of the live transport.
    pub fn drop_connection(&self, endpoint: Endpoint) {
        if let Some(tx) = self.shared.live.lock().remove(&endpoint.url(BASE_URL)) {
            let _ = tx.send(TransportEvent::Closed {
                error: Some("connection reset".to_string()),
            });
        }
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every invocation of `method` fail with an application error.
    pub fn fail_method(&self, method: &str) {
        self.shared.failing_methods.lock().insert(method.to_string());
    }

    /// `(method, arguments)` invoked on `endpoint`, in call order.
    pub fn invocations(&self, endpoint: Endpoint) -> Vec<(String, Vec<Value>)> {
        let url = endpoint.url(BASE_URL);
        self.shared
            .invocations
            .lock()
            .iter()
            .filter(|(u, _, _)| *u == url)
            .map(|(_, method, arguments)| (method.clone(), arguments.clone()))
            .collect()
    }

    pub fn invoked(&self, endpoint: Endpoint, method: &str) -> bool {
        self.invocations(endpoint).iter().any(|(m, _)| m == method)
    }
}

#[async_trait]
impl HubConnector for FakeHub {
    async fn connect(&self, url: &str, _access_token: &str) -> RealtimeResult<HubSession> {
        *self.shared.connects.lock().entry(url.to_string()).or_default() += 1;

        let delay = *self.shared.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.live.lock().insert(url.to_string(), tx.clone());

        Ok(HubSession {
            link: Arc::new(FakeLink {
                url: url.to_string(),
                tx,
                shared: self.shared.clone(),
            }),
            events: rx,
        })
    }
}

struct FakeLink {
    url: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
    shared: Arc<HubShared>,
}

#[async_trait]
impl HubLink for FakeLink {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> RealtimeResult<Value> {
        self.shared
            .invocations
            .lock()
            .push((self.url.clone(), target.to_string(), arguments));

        if self.shared.failing_methods.lock().contains(target) {
            return Err(RealtimeError::Application(format!("{target} rejected")));
        }
        Ok(Value::Null)
    }

    async fn close(&self) {
        let mut live = self.shared.live.lock();
        if live.get(&self.url).is_some_and(|tx| tx.same_channel(&self.tx)) {
            live.remove(&self.url);
        }
    }
}

#[derive(Default)]
struct BackendState {
    sessions: BTreeMap<i64, ChatSessionDto>,
    messages: Vec<ChatMessageDto>,
    next_session_id: i64,
    next_message_id: i64,
}

/// In-memory REST chat store. Session ids start at 100, message ids at 501.
pub struct FakeChatBackend {
    state: Mutex<BackendState>,
    send_delay: Mutex<Duration>,
    listing_delay: Mutex<Duration>,
    fail_sends: AtomicBool,
}

impl Default for FakeChatBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(BackendState {
                next_session_id: 100,
                next_message_id: 501,
                ..Default::default()
            }),
            send_delay: Mutex::new(Duration::ZERO),
            listing_delay: Mutex::new(Duration::ZERO),
            fail_sends: AtomicBool::new(false),
        }
    }
}

impl FakeChatBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Delay answering the active-session list after its snapshot is taken.
    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock() = delay;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Store a message directly, as another client would.
    pub fn insert_message(&self, session_id: i64, sender_id: i64, receiver_id: i64, text: &str) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_message_id;
        state.next_message_id += 1;
        state.messages.push(ChatMessageDto {
            id,
            session_id: Some(session_id),
            sender_id,
            sender_name: None,
            receiver_id,
            message: text.to_string(),
            is_read: false,
            created_at: Utc::now(),
        });
        id
    }

    /// Open a session directly, as another client would.
    pub fn insert_session(&self, customer_id: i64, manager_id: Option<i64>) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;
        state.sessions.insert(id, session(id, customer_id, manager_id));
        id
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }
}

fn session(id: i64, customer_id: i64, manager_id: Option<i64>) -> ChatSessionDto {
    ChatSessionDto {
        id,
        customer_id,
        customer_name: None,
        manager_id,
        manager_name: None,
        is_active: true,
        topic: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

#[async_trait]
impl ChatApi for FakeChatBackend {
    async fn get_active_sessions(&self) -> RealtimeResult<ApiResponse<Vec<ChatSessionDto>>> {
        let snapshot: Vec<ChatSessionDto> = {
            let state = self.state.lock();
            state.sessions.values().filter(|s| s.is_active).cloned().collect()
        };
        let delay = *self.listing_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(ApiResponse::ok(snapshot))
    }

    async fn get_session_messages(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> RealtimeResult<ApiResponse<Vec<ChatMessageDto>>> {
        let state = self.state.lock();
        let skip = (page.max(1) as usize - 1) * size as usize;
        Ok(ApiResponse::ok(
            state
                .messages
                .iter()
                .filter(|m| m.session_id == Some(session_id))
                .skip(skip)
                .take(size as usize)
                .cloned()
                .collect(),
        ))
    }

    async fn send_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        text: &str,
    ) -> RealtimeResult<ApiResponse<ChatMessageDto>> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Ok(ApiResponse::failed("message store unavailable"));
        }

        let mut state = self.state.lock();
        let session_id = state
            .sessions
            .values()
            .find(|s| {
                s.manager_id.is_some_and(|manager| {
                    (s.customer_id == sender_id && manager == receiver_id)
                        || (s.customer_id == receiver_id && manager == sender_id)
                })
            })
            .map(|s| s.id);

        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = ChatMessageDto {
            id,
            session_id,
            sender_id,
            sender_name: None,
            receiver_id,
            message: text.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(ApiResponse::ok(message))
    }

    async fn mark_message_as_read(&self, message_id: i64) -> RealtimeResult<ApiResponse<Value>> {
        let mut state = self.state.lock();
        match state.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.is_read = true;
                Ok(ApiResponse::ok(Value::Bool(true)))
            }
            None => Ok(ApiResponse::failed("message not found")),
        }
    }

    async fn end_chat_session(&self, session_id: i64) -> RealtimeResult<ApiResponse<Value>> {
        let mut state = self.state.lock();
        match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.is_active = false;
                Ok(ApiResponse::ok(Value::Bool(true)))
            }
            None => Ok(ApiResponse::failed("session not found")),
        }
    }

    async fn create_chat_session(
        &self,
        customer_id: i64,
        topic: &str,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>> {
        let mut state = self.state.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;

        let mut created = session(id, customer_id, None);
        created.topic = Some(topic.to_string());
        state.sessions.insert(id, created.clone());
        Ok(ApiResponse::ok(created))
    }

    async fn assign_manager_to_session(
        &self,
        session_id: i64,
        manager_id: i64,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>> {
        let mut state = self.state.lock();
        match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.manager_id = Some(manager_id);
                session.updated_at = Some(Utc::now());
                Ok(ApiResponse::ok(session.clone()))
            }
            None => Ok(ApiResponse::failed("session not found")),
        }
    }
}
