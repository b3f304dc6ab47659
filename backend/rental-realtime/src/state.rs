use crate::{
    auth::SharedTokenProvider,
    channels::ChannelOrchestrator,
    chat::ChatReconciler,
    config::Config,
    error::RealtimeResult,
    hub::{ConnectionMultiplexer, HubConnector},
    notifications::{JsonFileStorage, NotificationCenter, NotificationStorage},
    rest::{ChatApi, HttpChatApi},
};
use std::sync::Arc;

/// Process-wide realtime services. Build once at startup and hand clones to
/// whatever needs them; every field shares the same multiplexer.
#[derive(Clone)]
pub struct RealtimeState {
    pub config: Arc<Config>,
    pub hub: ConnectionMultiplexer,
    pub channels: Arc<ChannelOrchestrator>,
    pub notifications: NotificationCenter,
    pub chat: ChatReconciler,
}

impl RealtimeState {
    /// WebSocket hubs, HTTP chat API and file-backed notification history.
    pub fn from_config(config: Config, tokens: SharedTokenProvider) -> RealtimeResult<Self> {
        let hub = ConnectionMultiplexer::websocket(&config.hub, tokens.clone());
        let api = Arc::new(HttpChatApi::new(&config.api, tokens.clone())?);
        let storage = Arc::new(JsonFileStorage::new(&config.notifications.storage_dir));
        Ok(Self::assemble(config, hub, api, storage, tokens))
    }

    /// Same wiring over caller-supplied collaborators.
    pub fn with_parts(
        config: Config,
        connector: Arc<dyn HubConnector>,
        api: Arc<dyn ChatApi>,
        storage: Arc<dyn NotificationStorage>,
        tokens: SharedTokenProvider,
    ) -> Self {
        let hub = ConnectionMultiplexer::new(&config.hub, connector, tokens.clone());
        Self::assemble(config, hub, api, storage, tokens)
    }

    fn assemble(
        config: Config,
        hub: ConnectionMultiplexer,
        api: Arc<dyn ChatApi>,
        storage: Arc<dyn NotificationStorage>,
        tokens: SharedTokenProvider,
    ) -> Self {
        let notifications = NotificationCenter::new(storage, config.notifications.history_limit);
        let chat = ChatReconciler::new(hub.clone(), api, tokens);
        let channels = Arc::new(ChannelOrchestrator::new(hub.clone()));

        Self {
            config: Arc::new(config),
            hub,
            channels,
            notifications,
            chat,
        }
    }

    /// Logout: drop every connection.
    pub async fn shutdown(&self) {
        self.channels.teardown().await;
        if let Err(e) = self.chat.disconnect().await {
            tracing::warn!(error = %e, "chat disconnect failed");
        }
        self.hub.disconnect_all().await;
    }
}
