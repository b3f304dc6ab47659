/// Chat Session/Message Reconciler
///
/// Holds the active sessions and their message lists, merging what arrives
/// on the chat hub with what the REST store returns. User actions go to the
/// hub first (fast fan-out, best effort) and to REST second (authoritative).
///
/// Locks are never held across an await; state is patched by id after every
/// suspension point.
use super::models::{ChatMessage, ChatSession};
use super::reconcile::{self, MergeOutcome};
use crate::auth::{self, SharedTokenProvider};
use crate::channels::{AcceptChatRequest, Channel, ChatChannel, Identity, SendMessageRequest};
use crate::endpoint::Endpoint;
use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::{names, ConnectionMultiplexer, HubEvent, IncomingMessage, SubscriptionId};
use crate::rest::{ApiResponse, ChatApi};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Default)]
struct ChatState {
    identity: Option<Identity>,
    connected: bool,
    /// Active sessions, in the order they became known
    sessions: Vec<ChatSession>,
    messages: HashMap<i64, Vec<ChatMessage>>,
    /// Session refreshes currently waiting on REST
    refreshes: usize,
    revision: u64,
    /// Revision of the last local change per session, kept while a refresh runs
    touched: HashMap<i64, u64>,
}

impl ChatState {
    fn session_mut(&mut self, session_id: i64) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn touch(&mut self, session_id: i64) {
        if self.refreshes > 0 {
            self.revision += 1;
            self.touched.insert(session_id, self.revision);
        }
    }

    fn changed_since(&self, session_id: i64, revision: u64) -> bool {
        self.touched.get(&session_id).is_some_and(|&at| at > revision)
    }

    fn upsert_session(&mut self, session: ChatSession) {
        self.touch(session.id);
        match self.session_mut(session.id) {
            Some(existing) => *existing = session,
            None => {
                self.messages.entry(session.id).or_default();
                self.sessions.push(session);
            }
        }
    }

    fn remove_session(&mut self, session_id: i64) -> bool {
        self.touch(session_id);
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);
        self.messages.remove(&session_id);
        self.sessions.len() != before
    }

    fn begin_refresh(&mut self) -> u64 {
        self.refreshes += 1;
        self.revision
    }

    fn end_refresh(&mut self) {
        self.refreshes = self.refreshes.saturating_sub(1);
        if self.refreshes == 0 {
            self.touched.clear();
        }
    }

    /// Merge a REST session list fetched after `started`.
    ///
    /// Sessions changed locally since then keep their local state: an ended
    /// one stays gone and a created or updated one is kept as is.
    fn apply_refresh(&mut self, fetched: Vec<ChatSession>, started: u64) -> usize {
        let mut sessions: Vec<ChatSession> = Vec::with_capacity(fetched.len());
        for session in fetched {
            if !self.changed_since(session.id, started) {
                sessions.push(session);
            } else if let Some(local) = self.sessions.iter().find(|s| s.id == session.id) {
                sessions.push(local.clone());
            }
        }
        for local in &self.sessions {
            if self.changed_since(local.id, started) && !sessions.iter().any(|s| s.id == local.id) {
                sessions.push(local.clone());
            }
        }

        let mut messages = std::mem::take(&mut self.messages);
        self.messages = sessions
            .iter()
            .map(|s| (s.id, messages.remove(&s.id).unwrap_or_default()))
            .collect();
        self.sessions = sessions;
        self.sessions.len()
    }

    /// Most recent active session between `a` and `b`.
    fn attribute(&self, a: i64, b: i64) -> Option<i64> {
        self.sessions
            .iter()
            .filter(|s| s.is_active && s.involves(a, b))
            .max_by_key(|s| s.created_at)
            .map(|s| s.id)
    }
}

/// Balances `begin_refresh` even when the refresh future is dropped.
struct RefreshGuard<'a> {
    state: &'a Mutex<ChatState>,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().end_refresh();
    }
}

struct ReconcilerInner {
    hub: ConnectionMultiplexer,
    channel: ChatChannel,
    api: Arc<dyn ChatApi>,
    tokens: SharedTokenProvider,
    state: Mutex<ChatState>,
    next_temp_id: AtomicU64,
    handlers: Mutex<Vec<(&'static str, SubscriptionId)>>,
}

#[derive(Clone)]
pub struct ChatReconciler {
    inner: Arc<ReconcilerInner>,
}

impl ChatReconciler {
    pub fn new(hub: ConnectionMultiplexer, api: Arc<dyn ChatApi>, tokens: SharedTokenProvider) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                channel: ChatChannel::new(hub.clone()),
                hub,
                api,
                tokens,
                state: Mutex::new(ChatState::default()),
                next_temp_id: AtomicU64::new(1),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open the chat hub for `identity` and load the active sessions.
    ///
    /// Fails with `AuthMissing` before touching the hub when no token is
    /// available. Counts as connected only once the session list is loaded;
    /// on failure the identity and hub handlers are released again.
    pub async fn connect(&self, identity: Identity) -> RealtimeResult<()> {
        if auth::resolve(self.inner.tokens.as_ref()).is_none() {
            warn!(user_id = identity.user_id, "chat connect without access token");
            return Err(RealtimeError::AuthMissing);
        }

        self.inner.state.lock().identity = Some(identity);
        self.attach_handlers();

        let loaded = match self.inner.channel.connect().await {
            Ok(()) => self.refresh_sessions().await,
            Err(e) => Err(e),
        };
        let sessions = match loaded {
            Ok(sessions) => sessions,
            Err(e) => {
                self.detach_handlers();
                self.inner.state.lock().identity = None;
                warn!(user_id = identity.user_id, error = %e, "chat connect failed");
                return Err(e);
            }
        };

        self.inner.state.lock().connected = true;
        info!(user_id = identity.user_id, sessions, "chat connected");
        Ok(())
    }

    /// Close the chat hub. Sessions and messages already loaded are kept.
    pub async fn disconnect(&self) -> RealtimeResult<()> {
        self.detach_handlers();
        self.inner.state.lock().connected = false;
        self.inner.channel.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected && self.inner.hub.is_connected(Endpoint::Chat)
    }

    /// Send `text`, showing it immediately under a pending id.
    ///
    /// Returns `true` once REST confirmed the message. On failure the pending
    /// entry stays visible, flagged as failed; a copy already fanned out over
    /// the hub is not retracted.
    pub async fn send_message(&self, sender_id: i64, receiver_id: i64, text: &str, session_id: i64) -> bool {
        let temp_id = self.inner.next_temp_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.inner.state.lock();
            match state.messages.get_mut(&session_id) {
                Some(messages) => messages.push(ChatMessage::pending(
                    temp_id,
                    session_id,
                    sender_id,
                    receiver_id,
                    text,
                )),
                None => {
                    warn!(session_id, "send to unknown session");
                    return false;
                }
            }
        }

        let request = SendMessageRequest {
            sender_id,
            receiver_id,
            message: text.to_string(),
            session_id: Some(session_id),
        };
        if let Err(e) = self.inner.channel.send_message(&request).await {
            debug!(session_id, error = %e, "hub send failed, relying on REST");
        }

        let confirmed = self
            .inner
            .api
            .send_message(sender_id, receiver_id, text)
            .await
            .and_then(ApiResponse::into_data);

        let mut state = self.inner.state.lock();
        let Some(messages) = state.messages.get_mut(&session_id) else {
            debug!(session_id, "session ended while sending");
            return confirmed.is_ok();
        };

        match confirmed {
            Ok(dto) => {
                let record = ChatMessage::from_dto(dto, session_id);
                let outcome = reconcile::confirm(messages, temp_id, record);
                debug!(session_id, temp_id, ?outcome, "message confirmed");
                true
            }
            Err(e) => {
                reconcile::mark_send_failed(messages, temp_id);
                warn!(session_id, temp_id, error = %e, "message send failed");
                false
            }
        }
    }

    /// Mark `message_id` read everywhere, then tell the hub and REST.
    ///
    /// The local flip is not rolled back on failure.
    pub async fn mark_message_read(&self, message_id: i64) -> bool {
        let user_id = {
            let mut state = self.inner.state.lock();
            let flipped = state
                .messages
                .values_mut()
                .fold(false, |acc, messages| reconcile::mark_read(messages, message_id) || acc);
            debug!(message_id, flipped, "marked read locally");
            state.identity.map(|identity| identity.user_id)
        };

        if let Some(user_id) = user_id {
            if let Err(e) = self.inner.channel.mark_as_read(message_id, user_id).await {
                debug!(message_id, error = %e, "hub read receipt failed");
            }
        }

        match self
            .inner
            .api
            .mark_message_as_read(message_id)
            .await
            .and_then(ApiResponse::into_unit)
        {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id, error = %e, "read confirmation failed");
                false
            }
        }
    }

    /// End `session_id`. The session is removed only once REST accepted.
    pub async fn end_chat_session(&self, session_id: i64) -> bool {
        if let Some(user_id) = self.user_id() {
            if let Err(e) = self.inner.channel.end_chat(session_id, user_id).await {
                debug!(session_id, error = %e, "hub end chat failed");
            }
        }

        match self
            .inner
            .api
            .end_chat_session(session_id)
            .await
            .and_then(ApiResponse::into_unit)
        {
            Ok(()) => {
                self.inner.state.lock().remove_session(session_id);
                info!(session_id, "chat session ended");
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "ending chat session failed");
                false
            }
        }
    }

    /// Create a session for the connected customer. Returns its id.
    pub async fn initiate_chat(&self, topic: &str) -> Option<i64> {
        let Some(customer_id) = self.user_id() else {
            warn!("initiate chat without identity");
            return None;
        };

        match self
            .inner
            .api
            .create_chat_session(customer_id, topic)
            .await
            .and_then(ApiResponse::into_data)
        {
            Ok(dto) => {
                let session = ChatSession::from(dto);
                let id = session.id;
                self.inner.state.lock().upsert_session(session);
                info!(session_id = id, customer_id, "chat session created");
                Some(id)
            }
            Err(e) => {
                warn!(customer_id, error = %e, "creating chat session failed");
                None
            }
        }
    }

    /// Accept `session_id` as the connected manager.
    pub async fn accept_chat(&self, session_id: i64) -> bool {
        let Some(manager_id) = self.user_id() else {
            warn!(session_id, "accept chat without identity");
            return false;
        };

        let request = AcceptChatRequest { manager_id };
        if let Err(e) = self.inner.channel.accept_chat(&request, session_id).await {
            debug!(session_id, error = %e, "hub accept failed");
        }

        match self
            .inner
            .api
            .assign_manager_to_session(session_id, manager_id)
            .await
            .and_then(ApiResponse::into_data)
        {
            Ok(dto) => {
                self.inner.state.lock().upsert_session(ChatSession::from(dto));
                info!(session_id, manager_id, "chat session accepted");
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "accepting chat session failed");
                false
            }
        }
    }

    /// Merge one page of REST history into `session_id`. Returns the number
    /// of messages that were not known yet.
    pub async fn load_session_messages(&self, session_id: i64, page: u32, size: u32) -> RealtimeResult<usize> {
        let page = self
            .inner
            .api
            .get_session_messages(session_id, page, size)
            .await?
            .into_data()?;

        let records = page
            .into_iter()
            .map(|dto| ChatMessage::from_dto(dto, session_id))
            .collect();

        let mut state = self.inner.state.lock();
        let messages = state.messages.entry(session_id).or_default();
        let inserted = reconcile::merge_history(messages, records);
        debug!(session_id, inserted, "session history merged");
        Ok(inserted)
    }

    /// Reload the active sessions from REST.
    ///
    /// Local creates, accepts and ends that land while the request is in
    /// flight win over the older REST answer for those sessions.
    pub async fn refresh_sessions(&self) -> RealtimeResult<usize> {
        let started = self.inner.state.lock().begin_refresh();
        let _refresh = RefreshGuard {
            state: &self.inner.state,
        };

        let sessions: Vec<ChatSession> = self
            .inner
            .api
            .get_active_sessions()
            .await?
            .into_data()?
            .into_iter()
            .map(ChatSession::from)
            .filter(|s| s.is_active)
            .collect();

        let count = self.inner.state.lock().apply_refresh(sessions, started);
        debug!(count, "active sessions refreshed");
        Ok(count)
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.inner.state.lock().sessions.clone()
    }

    pub fn session(&self, session_id: i64) -> Option<ChatSession> {
        self.inner
            .state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    pub fn messages(&self, session_id: i64) -> Vec<ChatMessage> {
        self.inner
            .state
            .lock()
            .messages
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Unread messages addressed to `user_id` in `session_id`.
    pub fn unread_count(&self, session_id: i64, user_id: i64) -> usize {
        self.inner
            .state
            .lock()
            .messages
            .get(&session_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.receiver_id == user_id && !m.is_read)
                    .count()
            })
            .unwrap_or(0)
    }

    fn user_id(&self) -> Option<i64> {
        self.inner.state.lock().identity.map(|identity| identity.user_id)
    }

    fn attach_handlers(&self) {
        self.detach_handlers();

        let events = [
            names::RECEIVE_MESSAGE,
            names::MESSAGE_READ,
            names::CHAT_ACCEPTED,
            names::CHAT_ENDED,
        ];
        let ids: Vec<(&'static str, SubscriptionId)> = events
            .into_iter()
            .map(|event| {
                // Weak: the multiplexer outlives a dropped reconciler
                let weak = Arc::downgrade(&self.inner);
                let id = self
                    .inner
                    .hub
                    .on(Endpoint::Chat, event, move |event| dispatch(&weak, event));
                (event, id)
            })
            .collect();

        *self.inner.handlers.lock() = ids;
    }

    fn detach_handlers(&self) {
        let handlers = std::mem::take(&mut *self.inner.handlers.lock());
        for (event, id) in handlers {
            self.inner.hub.off(Endpoint::Chat, event, Some(id));
        }
    }

    fn on_message(&self, message: &IncomingMessage) {
        let mut state = self.inner.state.lock();
        let Some(session_id) = state.attribute(message.sender_id, message.receiver_id) else {
            debug!(
                message_id = message.message_id,
                sender_id = message.sender_id,
                receiver_id = message.receiver_id,
                "dropping message with no matching session"
            );
            return;
        };

        let messages = state.messages.entry(session_id).or_default();
        let outcome = reconcile::apply_push(messages, ChatMessage::from_push(message, session_id));
        if outcome == MergeOutcome::Duplicate {
            debug!(message_id = message.message_id, session_id, "duplicate push message");
        }
    }

    fn on_message_read(&self, message_id: i64) {
        let mut state = self.inner.state.lock();
        for messages in state.messages.values_mut() {
            reconcile::mark_read(messages, message_id);
        }
    }

    fn on_accepted(&self, session_id: i64, manager_id: Option<i64>, manager_name: Option<&str>) {
        let known = {
            let mut state = self.inner.state.lock();
            let patched = state
                .session_mut(session_id)
                .map(|session| {
                    if manager_id.is_some() {
                        session.manager_id = manager_id;
                    }
                    if let Some(name) = manager_name {
                        session.manager_name = Some(name.to_string());
                    }
                    session.is_active = true;
                    session.updated_at = Some(Utc::now());
                })
                .is_some();
            if patched {
                state.touch(session_id);
            }
            patched
        };

        if known {
            debug!(session_id, ?manager_id, "session accepted");
            return;
        }

        debug!(session_id, "accepted session not known yet, refreshing");
        let reconciler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.refresh_sessions().await {
                warn!(session_id, error = %e, "session refresh after accept failed");
            }
        });
    }

    fn on_ended(&self, session_id: i64) {
        if self.inner.state.lock().remove_session(session_id) {
            info!(session_id, "chat session ended remotely");
        }
    }
}

fn dispatch(weak: &Weak<ReconcilerInner>, event: &HubEvent) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let reconciler = ChatReconciler { inner };

    match event {
        HubEvent::ReceiveMessage(message) => reconciler.on_message(message),
        HubEvent::MessageRead { message_id } => reconciler.on_message_read(*message_id),
        HubEvent::ChatAccepted {
            session_id,
            manager_id,
            manager_name,
        } => reconciler.on_accepted(*session_id, *manager_id, manager_name.as_deref()),
        HubEvent::ChatEnded { session_id } => reconciler.on_ended(*session_id),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::config::HubConfig;
    use crate::hub::{HubConnector, HubSession};
    use crate::rest::client::MockChatApi;
    use crate::rest::{ChatMessageDto, ChatSessionDto};
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::Value;

    /// Connector that never opens anything: every hub call fails fast.
    struct Unreachable;

    #[async_trait]
    impl HubConnector for Unreachable {
        async fn connect(&self, _url: &str, _token: &str) -> RealtimeResult<HubSession> {
            Err(RealtimeError::Transport("unreachable".into()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn session_dto(id: i64, manager_id: Option<i64>) -> ChatSessionDto {
        ChatSessionDto {
            id,
            customer_id: 7,
            customer_name: Some("A".into()),
            manager_id,
            manager_name: None,
            is_active: true,
            topic: Some("help".into()),
            created_at: now(),
            updated_at: None,
        }
    }

    fn build(api: MockChatApi, token: StaticToken) -> ChatReconciler {
        let hub = ConnectionMultiplexer::new(&HubConfig::default(), Arc::new(Unreachable), Arc::new(token.clone()));
        ChatReconciler::new(hub, Arc::new(api), Arc::new(token))
    }

    fn seed(reconciler: &ChatReconciler, session: ChatSessionDto) {
        reconciler.inner.state.lock().upsert_session(session.into());
    }

    fn push(message_id: i64, sender_id: i64, receiver_id: i64) -> IncomingMessage {
        IncomingMessage {
            message_id,
            sender_id,
            sender_name: None,
            receiver_id,
            text: "hi".into(),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn test_connect_without_token_fails_fast() {
        let mut api = MockChatApi::new();
        api.expect_get_active_sessions().never();

        let reconciler = build(api, StaticToken::none());
        let identity = Identity::new(7, crate::channels::Role::Customer).unwrap();

        assert_eq!(reconciler.connect(identity).await, Err(RealtimeError::AuthMissing));
        assert!(!reconciler.is_connected());
    }

    #[tokio::test]
    async fn test_failed_rest_send_leaves_pending_entry_flagged() {
        let mut api = MockChatApi::new();
        api.expect_send_message()
            .times(1)
            .returning(|_, _, _| Ok(ApiResponse::failed("rejected")));

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));

        assert!(!reconciler.send_message(7, 3, "hi", 100).await);

        let messages = reconciler.messages(100);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].id.is_pending());
        assert!(messages[0].send_failed);
    }

    #[tokio::test]
    async fn test_send_confirms_even_when_hub_is_down() {
        let mut api = MockChatApi::new();
        api.expect_send_message().returning(|sender_id, receiver_id, text| {
            Ok(ApiResponse::ok(ChatMessageDto {
                id: 501,
                session_id: Some(100),
                sender_id,
                sender_name: None,
                receiver_id,
                message: text.to_string(),
                is_read: false,
                created_at: Utc::now(),
            }))
        });

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));

        assert!(reconciler.send_message(7, 3, "hi", 100).await);
        let messages = reconciler.messages(100);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.confirmed(), Some(501));
    }

    #[tokio::test]
    async fn test_mark_read_is_optimistic_and_not_rolled_back() {
        let mut api = MockChatApi::new();
        api.expect_mark_message_as_read()
            .returning(|_| Err(RealtimeError::Transport("down".into())));

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));
        reconciler.on_message(&push(42, 7, 3));
        assert_eq!(reconciler.unread_count(100, 3), 1);

        assert!(!reconciler.mark_message_read(42).await);
        assert_eq!(reconciler.unread_count(100, 3), 0);
    }

    #[tokio::test]
    async fn test_end_session_requires_rest_success() {
        let mut api = MockChatApi::new();
        let mut calls = 0;
        api.expect_end_chat_session().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(ApiResponse::failed("nope"))
            } else {
                Ok(ApiResponse::ok(Value::Null))
            }
        });

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));

        assert!(!reconciler.end_chat_session(100).await);
        assert!(reconciler.session(100).is_some());

        assert!(reconciler.end_chat_session(100).await);
        assert!(reconciler.session(100).is_none());
        assert!(reconciler.messages(100).is_empty());
    }

    #[tokio::test]
    async fn test_unattributable_push_is_dropped() {
        let reconciler = build(MockChatApi::new(), StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));

        reconciler.on_message(&push(1, 8, 9));
        assert!(reconciler.messages(100).is_empty());

        reconciler.on_message(&push(2, 3, 7));
        assert_eq!(reconciler.messages(100).len(), 1);
    }

    #[tokio::test]
    async fn test_remote_events_patch_sessions() {
        let reconciler = build(MockChatApi::new(), StaticToken::new("t"));
        seed(&reconciler, session_dto(100, None));

        reconciler.on_accepted(100, Some(3), Some("Bob"));
        let session = reconciler.session(100).unwrap();
        assert_eq!(session.manager_id, Some(3));
        assert_eq!(session.manager_name.as_deref(), Some("Bob"));

        reconciler.on_ended(100);
        assert!(reconciler.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_messages_of_surviving_sessions() {
        let mut api = MockChatApi::new();
        api.expect_get_active_sessions()
            .returning(|| Ok(ApiResponse::ok(vec![session_dto(100, Some(3))])));

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));
        seed(&reconciler, session_dto(200, Some(4)));
        reconciler.on_message(&push(42, 7, 3));

        assert_eq!(reconciler.refresh_sessions().await, Ok(1));
        assert_eq!(reconciler.messages(100).len(), 1);
        assert!(reconciler.session(200).is_none());
    }

    #[test]
    fn test_apply_refresh_prefers_changes_made_in_flight() {
        let mut state = ChatState::default();
        state.upsert_session(session_dto(100, None).into());
        state.upsert_session(session_dto(200, None).into());

        let started = state.begin_refresh();
        state.remove_session(200);
        state.upsert_session(session_dto(100, Some(3)).into());
        state.upsert_session(session_dto(300, None).into());

        let fetched: Vec<ChatSession> = vec![
            session_dto(100, None).into(),
            session_dto(200, None).into(),
            session_dto(400, None).into(),
        ];
        assert_eq!(state.apply_refresh(fetched, started), 3);
        state.end_refresh();

        let ids: Vec<i64> = state.sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![100, 400, 300]);
        assert_eq!(state.sessions[0].manager_id, Some(3));
        assert!(state.touched.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_is_balanced() {
        let mut api = MockChatApi::new();
        api.expect_get_active_sessions()
            .returning(|| Err(RealtimeError::Transport("down".into())));

        let reconciler = build(api, StaticToken::new("t"));
        seed(&reconciler, session_dto(100, Some(3)));

        assert!(reconciler.refresh_sessions().await.is_err());
        let state = reconciler.inner.state.lock();
        assert_eq!(state.refreshes, 0);
        assert_eq!(state.sessions.len(), 1);
    }
}
