/// `reqwest` implementation of [`ChatApi`]
use super::client::ChatApi;
use super::models::{ApiResponse, ChatMessageDto, ChatSessionDto, CreateSessionBody, SendMessageBody};
use crate::auth::{self, SharedTokenProvider};
use crate::config::ApiConfig;
use crate::error::{RealtimeError, RealtimeResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct HttpChatApi {
    http: Client,
    base_url: String,
    tokens: SharedTokenProvider,
}

impl HttpChatApi {
    pub fn new(config: &ApiConfig, tokens: SharedTokenProvider) -> RealtimeResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RealtimeError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with the bearer token and decode the envelope. Non-2xx replies
    /// that still carry an envelope are returned as-is.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> RealtimeResult<ApiResponse<T>> {
        let token = auth::resolve(self.tokens.as_ref()).ok_or(RealtimeError::AuthMissing)?;

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(status = status.as_u16(), bytes = body.len(), "chat api response");

        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(RealtimeError::Application(format!("HTTP {status}"))),
        }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn get_active_sessions(&self) -> RealtimeResult<ApiResponse<Vec<ChatSessionDto>>> {
        self.send(self.http.get(self.url("/chat/sessions/active")))
            .await
    }

    async fn get_session_messages(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> RealtimeResult<ApiResponse<Vec<ChatMessageDto>>> {
        let url = self.url(&format!("/chat/sessions/{session_id}/messages"));
        self.send(self.http.get(url).query(&[("page", page), ("size", size)]))
            .await
    }

    async fn send_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        text: &str,
    ) -> RealtimeResult<ApiResponse<ChatMessageDto>> {
        let body = SendMessageBody {
            sender_id,
            receiver_id,
            message: text.to_string(),
        };
        self.send(self.http.post(self.url("/chat/messages")).json(&body))
            .await
    }

    async fn mark_message_as_read(&self, message_id: i64) -> RealtimeResult<ApiResponse<Value>> {
        let url = self.url(&format!("/chat/messages/{message_id}/read"));
        self.send(self.http.put(url)).await
    }

    async fn end_chat_session(&self, session_id: i64) -> RealtimeResult<ApiResponse<Value>> {
        let url = self.url(&format!("/chat/sessions/{session_id}/end"));
        self.send(self.http.put(url)).await
    }

    async fn create_chat_session(
        &self,
        customer_id: i64,
        topic: &str,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>> {
        let body = CreateSessionBody {
            customer_id,
            topic: topic.to_string(),
        };
        self.send(self.http.post(self.url("/chat/sessions")).json(&body))
            .await
    }

    async fn assign_manager_to_session(
        &self,
        session_id: i64,
        manager_id: i64,
    ) -> RealtimeResult<ApiResponse<ChatSessionDto>> {
        let url = self.url(&format!("/chat/sessions/{session_id}/assign/{manager_id}"));
        self.send(self.http.put(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer, token: StaticToken) -> HttpChatApi {
        let config = ApiConfig {
            base_url: format!("{}/api/", server.uri()),
            request_timeout: Duration::from_secs(5),
        };
        HttpChatApi::new(&config, Arc::new(token)).unwrap()
    }

    #[tokio::test]
    async fn test_active_sessions_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/sessions/active"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "",
                "data": [{"id": 100, "customerId": 7, "createdAt": "2024-05-01T10:00:00Z"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sessions = api(&server, StaticToken::new("secret"))
            .get_active_sessions()
            .await
            .unwrap()
            .into_data()
            .unwrap();

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].customer_id, 7);
    }

    #[tokio::test]
    async fn test_send_message_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/messages"))
            .and(body_json(json!({"senderId": 7, "receiverId": 3, "message": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "sent",
                "data": {
                    "id": 501, "senderId": 7, "receiverId": 3,
                    "message": "hi", "createdAt": "2024-05-01T10:00:00Z"
                }
            })))
            .mount(&server)
            .await;

        let message = api(&server, StaticToken::new("secret"))
            .send_message(7, 3, "hi")
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(message.id, 501);
    }

    #[tokio::test]
    async fn test_session_messages_paging_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/sessions/100/messages"))
            .and(query_param("page", "2"))
            .and(query_param("size", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "message": "", "data": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = api(&server, StaticToken::new("secret"))
            .get_session_messages(100, 2, 20)
            .await
            .unwrap();
        assert_eq!(page.into_data().unwrap(), vec![]);
    }

    #[tokio::test]
    async fn test_error_envelope_on_4xx_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/chat/sessions/100/assign/3"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "success": false, "message": "already assigned", "data": null
            })))
            .mount(&server)
            .await;

        let response = api(&server, StaticToken::new("secret"))
            .assign_manager_to_session(100, 3)
            .await
            .unwrap();
        assert_eq!(
            response.into_data(),
            Err(RealtimeError::Application("already assigned".into()))
        );
    }

    #[tokio::test]
    async fn test_plain_5xx_is_application_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/chat/sessions/100/end"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let result = api(&server, StaticToken::new("secret"))
            .end_chat_session(100)
            .await;
        assert!(matches!(result, Err(RealtimeError::Application(_))));
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = api(&server, StaticToken::none()).mark_message_as_read(1).await;
        assert_eq!(result, Err(RealtimeError::AuthMissing));
    }
}
