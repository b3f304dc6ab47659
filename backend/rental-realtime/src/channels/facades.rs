/// Typed per-channel facades
///
/// Each facade is bound to one endpoint and only forwards to the shared
/// [`ConnectionMultiplexer`]; none of them hold state of their own.
use crate::endpoint::Endpoint;
use crate::error::RealtimeResult;
use crate::hub::{
    names, ConnectionMultiplexer, ConnectionState, HubEvent, IncomingMessage, NotificationScope,
    PushNotification, SubscriptionId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Server methods invoked over the hubs
pub mod methods {
    pub const REGISTER_USER_CONNECTION: &str = "RegisterUserConnection";
    pub const REGISTER_ADMIN_CONNECTION: &str = "RegisterAdminConnection";
    pub const JOIN_ROLE_GROUP: &str = "JoinRoleGroup";
    pub const JOIN_USER_SPECIFIC_GROUP: &str = "JoinUserSpecificGroup";
    pub const SEND_MESSAGE: &str = "SendMessage";
    pub const MARK_AS_READ: &str = "MarkAsRead";
    pub const END_CHAT: &str = "EndChat";
    pub const INITIATE_CHAT: &str = "InitiateChat";
    pub const ACCEPT_CHAT: &str = "AcceptChat";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateChatRequest {
    pub customer_id: i64,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptChatRequest {
    pub manager_id: i64,
}

/// Endpoint binding shared by every facade
#[derive(Clone)]
pub struct ChannelBinding {
    hub: ConnectionMultiplexer,
    endpoint: Endpoint,
}

impl ChannelBinding {
    pub fn new(hub: ConnectionMultiplexer, endpoint: Endpoint) -> Self {
        Self { hub, endpoint }
    }
}

/// Operations every facade exposes.
#[async_trait]
pub trait Channel: Send + Sync {
    fn binding(&self) -> &ChannelBinding;

    fn endpoint(&self) -> Endpoint {
        self.binding().endpoint
    }

    async fn connect(&self) -> RealtimeResult<()> {
        let binding = self.binding();
        binding.hub.connect(binding.endpoint).await
    }

    async fn disconnect(&self) -> RealtimeResult<()> {
        let binding = self.binding();
        binding.hub.disconnect(binding.endpoint).await
    }

    fn state(&self) -> ConnectionState {
        let binding = self.binding();
        binding.hub.state(binding.endpoint)
    }

    /// Subscribe to a raw event name on this channel.
    fn on_event<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        let binding = self.binding();
        binding.hub.on(binding.endpoint, event, callback)
    }

    fn off(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        let binding = self.binding();
        binding.hub.off(binding.endpoint, event, id)
    }

    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> RealtimeResult<Value> {
        let binding = self.binding();
        binding.hub.invoke(binding.endpoint, method, arguments).await
    }
}

#[derive(Clone)]
pub struct ChatChannel {
    binding: ChannelBinding,
}

impl Channel for ChatChannel {
    fn binding(&self) -> &ChannelBinding {
        &self.binding
    }
}

impl ChatChannel {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self {
            binding: ChannelBinding::new(hub, Endpoint::Chat),
        }
    }

    pub async fn register_user_connection(&self) -> RealtimeResult<()> {
        self.invoke(methods::REGISTER_USER_CONNECTION, vec![]).await?;
        Ok(())
    }

    pub async fn send_message(&self, request: &SendMessageRequest) -> RealtimeResult<()> {
        self.invoke(methods::SEND_MESSAGE, vec![json!(request)]).await?;
        Ok(())
    }

    pub async fn mark_as_read(&self, message_id: i64, user_id: i64) -> RealtimeResult<()> {
        self.invoke(methods::MARK_AS_READ, vec![json!(message_id), json!(user_id)])
            .await?;
        Ok(())
    }

    pub async fn end_chat(&self, session_id: i64, user_id: i64) -> RealtimeResult<()> {
        self.invoke(methods::END_CHAT, vec![json!(session_id), json!(user_id)])
            .await?;
        Ok(())
    }

    pub async fn initiate_chat(&self, request: &InitiateChatRequest) -> RealtimeResult<Value> {
        self.invoke(methods::INITIATE_CHAT, vec![json!(request)]).await
    }

    pub async fn accept_chat(&self, request: &AcceptChatRequest, session_id: i64) -> RealtimeResult<()> {
        self.invoke(methods::ACCEPT_CHAT, vec![json!(request), json!(session_id)])
            .await?;
        Ok(())
    }

    pub fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&IncomingMessage) + Send + Sync + 'static,
    {
        self.on_event(names::RECEIVE_MESSAGE, move |event| {
            if let HubEvent::ReceiveMessage(message) = event {
                callback(message);
            }
        })
    }

    pub fn on_message_read<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.on_event(names::MESSAGE_READ, move |event| {
            if let HubEvent::MessageRead { message_id } = event {
                callback(*message_id);
            }
        })
    }

    pub fn on_chat_accepted<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i64, Option<i64>, Option<&str>) + Send + Sync + 'static,
    {
        self.on_event(names::CHAT_ACCEPTED, move |event| {
            if let HubEvent::ChatAccepted {
                session_id,
                manager_id,
                manager_name,
            } = event
            {
                callback(*session_id, *manager_id, manager_name.as_deref());
            }
        })
    }

    pub fn on_chat_ended<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.on_event(names::CHAT_ENDED, move |event| {
            if let HubEvent::ChatEnded { session_id } = event {
                callback(*session_id);
            }
        })
    }
}

#[derive(Clone)]
pub struct NotificationChannel {
    binding: ChannelBinding,
}

impl Channel for NotificationChannel {
    fn binding(&self) -> &ChannelBinding {
        &self.binding
    }
}

impl NotificationChannel {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self {
            binding: ChannelBinding::new(hub, Endpoint::Notification),
        }
    }

    pub async fn join_role_group(&self, role: &str) -> RealtimeResult<()> {
        self.invoke(methods::JOIN_ROLE_GROUP, vec![json!(role)]).await?;
        Ok(())
    }

    pub async fn join_user_group(&self, user_id: i64) -> RealtimeResult<()> {
        self.invoke(methods::JOIN_USER_SPECIFIC_GROUP, vec![json!(user_id)])
            .await?;
        Ok(())
    }

    /// Subscribe to user, role and broadcast notifications at once.
    pub fn on_notification<F>(&self, callback: F) -> Vec<SubscriptionId>
    where
        F: Fn(NotificationScope, &PushNotification) + Send + Sync + Clone + 'static,
    {
        names::NOTIFICATION_EVENTS
            .iter()
            .map(|event| {
                let callback = callback.clone();
                self.on_event(event, move |event| {
                    if let HubEvent::Notification {
                        scope,
                        notification,
                    } = event
                    {
                        callback(*scope, notification);
                    }
                })
            })
            .collect()
    }
}

/// Facade for the equipment, equipment-condition and equipment-stock hubs.
#[derive(Clone)]
pub struct EquipmentChannel {
    binding: ChannelBinding,
}

impl Channel for EquipmentChannel {
    fn binding(&self) -> &ChannelBinding {
        &self.binding
    }
}

impl EquipmentChannel {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self::for_endpoint(hub, Endpoint::Equipment)
    }

    pub fn condition(hub: ConnectionMultiplexer) -> Self {
        Self::for_endpoint(hub, Endpoint::EquipmentCondition)
    }

    pub fn stock(hub: ConnectionMultiplexer) -> Self {
        Self::for_endpoint(hub, Endpoint::EquipmentStock)
    }

    fn for_endpoint(hub: ConnectionMultiplexer, endpoint: Endpoint) -> Self {
        Self {
            binding: ChannelBinding::new(hub, endpoint),
        }
    }

    pub async fn register_admin_connection(&self, user_id: i64) -> RealtimeResult<()> {
        self.invoke(methods::REGISTER_ADMIN_CONNECTION, vec![json!(user_id)])
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct FeedbackChannel {
    binding: ChannelBinding,
}

impl Channel for FeedbackChannel {
    fn binding(&self) -> &ChannelBinding {
        &self.binding
    }
}

impl FeedbackChannel {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self {
            binding: ChannelBinding::new(hub, Endpoint::Feedback),
        }
    }
}

#[derive(Clone)]
pub struct ScheduleChannel {
    binding: ChannelBinding,
}

impl Channel for ScheduleChannel {
    fn binding(&self) -> &ChannelBinding {
        &self.binding
    }
}

impl ScheduleChannel {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self {
            binding: ChannelBinding::new(hub, Endpoint::Schedule),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_wire_shape() {
        let request = SendMessageRequest {
            sender_id: 7,
            receiver_id: 3,
            message: "hi".into(),
            session_id: Some(100),
        };
        assert_eq!(
            json!(request),
            json!({"senderId": 7, "receiverId": 3, "message": "hi", "sessionId": 100})
        );
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let request = InitiateChatRequest {
            customer_id: 7,
            topic: "help".into(),
            initial_message: None,
        };
        assert_eq!(json!(request), json!({"customerId": 7, "topic": "help"}));
    }
}
