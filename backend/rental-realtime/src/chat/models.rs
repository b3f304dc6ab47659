use crate::hub::IncomingMessage;
use crate::rest::{ChatMessageDto, ChatSessionDto};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Identity of a chat message.
///
/// A message sent from this client lives under a local `Pending` id until the
/// REST store assigns its `Confirmed` id. Two messages are the same message
/// only when their confirmed ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "id", rename_all = "lowercase")]
pub enum MessageId {
    Pending(u64),
    Confirmed(i64),
}

impl MessageId {
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageId::Pending(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Pending(temp) => write!(f, "pending-{temp}"),
            MessageId::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub receiver_id: i64,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// The REST store rejected this pending message
    pub send_failed: bool,
}

impl ChatMessage {
    pub fn pending(temp_id: u64, session_id: i64, sender_id: i64, receiver_id: i64, text: &str) -> Self {
        Self {
            id: MessageId::Pending(temp_id),
            session_id,
            sender_id,
            sender_name: None,
            receiver_id,
            text: text.to_string(),
            is_read: false,
            created_at: Utc::now(),
            send_failed: false,
        }
    }

    pub fn from_dto(dto: ChatMessageDto, session_id: i64) -> Self {
        Self {
            id: MessageId::Confirmed(dto.id),
            session_id: dto.session_id.unwrap_or(session_id),
            sender_id: dto.sender_id,
            sender_name: dto.sender_name,
            receiver_id: dto.receiver_id,
            text: dto.message,
            is_read: dto.is_read,
            created_at: dto.created_at,
            send_failed: false,
        }
    }

    pub fn from_push(message: &IncomingMessage, session_id: i64) -> Self {
        Self {
            id: MessageId::Confirmed(message.message_id),
            session_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            receiver_id: message.receiver_id,
            text: message.text.clone(),
            is_read: false,
            created_at: message.created_at,
            send_failed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no manager assigned yet
    Pending,
    Active,
    /// Terminal
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: i64,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    /// `None` while unassigned
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
    pub is_active: bool,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn status(&self) -> SessionStatus {
        if !self.is_active {
            SessionStatus::Ended
        } else if self.manager_id.is_none() {
            SessionStatus::Pending
        } else {
            SessionStatus::Active
        }
    }

    /// Whether a message between `a` and `b` belongs here, in either direction.
    pub fn involves(&self, a: i64, b: i64) -> bool {
        match self.manager_id {
            Some(manager) => {
                (self.customer_id == a && manager == b) || (self.customer_id == b && manager == a)
            }
            None => false,
        }
    }
}

impl From<ChatSessionDto> for ChatSession {
    fn from(dto: ChatSessionDto) -> Self {
        Self {
            id: dto.id,
            customer_id: dto.customer_id,
            customer_name: dto.customer_name,
            manager_id: dto.manager_id,
            manager_name: dto.manager_name,
            is_active: dto.is_active,
            topic: dto.topic,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}
