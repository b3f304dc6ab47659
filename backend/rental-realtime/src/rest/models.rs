use crate::error::{RealtimeError, RealtimeResult};
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform response envelope of the rental REST API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            data: Some(data),
            errors: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    /// Payload of a successful response; a rejection or missing payload
    /// becomes [`RealtimeError::Application`].
    pub fn into_data(self) -> RealtimeResult<T> {
        if !self.success {
            return Err(RealtimeError::Application(self.describe()));
        }
        self.data
            .ok_or_else(|| RealtimeError::Application("response carried no data".into()))
    }

    /// For calls whose payload is irrelevant.
    pub fn into_unit(self) -> RealtimeResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(RealtimeError::Application(self.describe()))
        }
    }

    fn describe(&self) -> String {
        match &self.errors {
            Some(errors) if !errors.is_empty() => format!("{} ({})", self.message, errors.join("; ")),
            _ if self.message.is_empty() => "request rejected".to_string(),
            _ => self.message.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionDto {
    pub id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub manager_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(with = "timestamp::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::lenient_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: i64,
    #[serde(default)]
    pub session_id: Option<i64>,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub receiver_id: i64,
    #[serde(alias = "content", alias = "text")]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "timestamp::lenient")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub customer_id: i64,
    pub topic: String,
}
