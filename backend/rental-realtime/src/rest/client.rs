/// REST collaborator contract for chat persistence
///
/// The REST store is authoritative for sessions and messages. Every call
/// returns the API's envelope; `Err` is reserved for requests that never got
/// an envelope back (transport or decoding failures).
use super::models::{ApiResponse, ChatMessageDto, ChatSessionDto};
use crate::error::RealtimeResult;
use async_trait::async_trait;
use serde_json::Value;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn get_active_sessions(&self) -> RealtimeResult<ApiResponse<Vec<ChatSessionDto>>>;

    async fn get_session_messages(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> RealtimeResult<ApiResponse<Vec<ChatMessageDto>>>;

    async fn send_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        text: &str,
    ) -> RealtimeResult<ApiResponse<ChatMessageDto>>;

    async fn mark_message_as_read(&self, message_id: i64) -> RealtimeResult<ApiResponse<Value>>;

    async fn end_chat_session(&self, session_id: i64) -> RealtimeResult<ApiResponse<Value>>;

    async fn create_chat_session(
        &self,
        customer_id: i64,
        topic: &str,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>>;

    async fn assign_manager_to_session(
        &self,
        session_id: i64,
        manager_id: i64,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>>;
}
