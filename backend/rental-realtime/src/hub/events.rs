/// Typed inbound hub events
///
/// Every invocation received from a hub is decoded once, at the multiplexer
/// boundary, into a [`HubEvent`]. Consumers pattern-match instead of picking
/// apart positional JSON arguments.
use crate::error::{RealtimeError, RealtimeResult};
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hub event names as sent by the server
pub mod names {
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    pub const MESSAGE_READ: &str = "MessageRead";
    pub const CHAT_ACCEPTED: &str = "ChatAccepted";
    pub const CHAT_ENDED: &str = "ChatEnded";
    pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";
    pub const RECEIVE_ROLE_NOTIFICATION: &str = "ReceiveRoleNotification";
    pub const RECEIVE_BROADCAST_NOTIFICATION: &str = "ReceiveBroadcastNotification";

    pub const NOTIFICATION_EVENTS: [&str; 3] = [
        RECEIVE_NOTIFICATION,
        RECEIVE_ROLE_NOTIFICATION,
        RECEIVE_BROADCAST_NOTIFICATION,
    ];
}

/// Chat message delivered over the push channel
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub receiver_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Audience a pushed notification was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationScope {
    User,
    Role,
    Broadcast,
}

/// Notification body pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, with = "timestamp::lenient_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "data")]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    ReceiveMessage(IncomingMessage),
    MessageRead {
        message_id: i64,
    },
    ChatAccepted {
        session_id: i64,
        manager_id: Option<i64>,
        manager_name: Option<String>,
    },
    ChatEnded {
        session_id: i64,
    },
    Notification {
        scope: NotificationScope,
        notification: PushNotification,
    },
    /// Any event without a dedicated variant (equipment, feedback, schedule...)
    Other {
        target: String,
        arguments: Vec<Value>,
    },
}

impl HubEvent {
    /// Decode the positional arguments of invocation `target`.
    pub fn decode(target: &str, arguments: Vec<Value>) -> RealtimeResult<Self> {
        let args = Args {
            target,
            values: &arguments,
        };

        let event = match target {
            names::RECEIVE_MESSAGE => HubEvent::ReceiveMessage(IncomingMessage {
                message_id: args.required(0, "messageId")?,
                sender_id: args.required(1, "senderId")?,
                sender_name: args.optional(2)?,
                receiver_id: args.required(3, "receiverId")?,
                text: args.optional(4)?.unwrap_or_default(),
                created_at: args
                    .optional::<String>(5)?
                    .as_deref()
                    .and_then(timestamp::parse)
                    .unwrap_or_else(Utc::now),
            }),
            names::MESSAGE_READ => HubEvent::MessageRead {
                message_id: args.required(0, "messageId")?,
            },
            names::CHAT_ACCEPTED => HubEvent::ChatAccepted {
                session_id: args.required(0, "sessionId")?,
                manager_id: args.optional(1)?,
                manager_name: args.optional(2)?,
            },
            names::CHAT_ENDED => HubEvent::ChatEnded {
                session_id: args.required(0, "sessionId")?,
            },
            names::RECEIVE_NOTIFICATION => HubEvent::Notification {
                scope: NotificationScope::User,
                notification: args.required(0, "notification")?,
            },
            names::RECEIVE_ROLE_NOTIFICATION => HubEvent::Notification {
                scope: NotificationScope::Role,
                notification: args.required(0, "notification")?,
            },
            names::RECEIVE_BROADCAST_NOTIFICATION => HubEvent::Notification {
                scope: NotificationScope::Broadcast,
                notification: args.required(0, "notification")?,
            },
            _ => HubEvent::Other {
                target: target.to_string(),
                arguments,
            },
        };

        Ok(event)
    }

    /// Name of the hub invocation this event came from.
    pub fn name(&self) -> &str {
        match self {
            HubEvent::ReceiveMessage(_) => names::RECEIVE_MESSAGE,
            HubEvent::MessageRead { .. } => names::MESSAGE_READ,
            HubEvent::ChatAccepted { .. } => names::CHAT_ACCEPTED,
            HubEvent::ChatEnded { .. } => names::CHAT_ENDED,
            HubEvent::Notification { scope, .. } => match scope {
                NotificationScope::User => names::RECEIVE_NOTIFICATION,
                NotificationScope::Role => names::RECEIVE_ROLE_NOTIFICATION,
                NotificationScope::Broadcast => names::RECEIVE_BROADCAST_NOTIFICATION,
            },
            HubEvent::Other { target, .. } => target,
        }
    }
}

struct Args<'a> {
    target: &'a str,
    values: &'a [Value],
}

impl Args<'_> {
    fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> RealtimeResult<T> {
        match self.values.get(index) {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone()).map_err(|e| {
                RealtimeError::Decode(format!("{}: argument {} ({}): {}", self.target, index, name, e))
            }),
            _ => Err(RealtimeError::Decode(format!(
                "{}: missing argument {} ({})",
                self.target, index, name
            ))),
        }
    }

    fn optional<T: DeserializeOwned>(&self, index: usize) -> RealtimeResult<Option<T>> {
        match self.values.get(index) {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RealtimeError::Decode(format!("{}: argument {}: {}", self.target, index, e))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_receive_message() {
        let event = HubEvent::decode(
            "ReceiveMessage",
            vec![
                json!(501),
                json!(7),
                json!("Alice"),
                json!(3),
                json!("hi"),
                json!("2024-05-01T10:00:00Z"),
            ],
        )
        .unwrap();

        match event {
            HubEvent::ReceiveMessage(msg) => {
                assert_eq!(msg.message_id, 501);
                assert_eq!(msg.sender_id, 7);
                assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
                assert_eq!(msg.receiver_id, 3);
                assert_eq!(msg.text, "hi");
                assert_eq!(msg.created_at.timestamp(), 1714557600);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_chat_accepted_without_manager_name() {
        let event = HubEvent::decode("ChatAccepted", vec![json!(100), json!(3)]).unwrap();
        assert_eq!(
            event,
            HubEvent::ChatAccepted {
                session_id: 100,
                manager_id: Some(3),
                manager_name: None,
            }
        );
    }

    #[test]
    fn test_decode_notification_scopes() {
        let body = json!({
            "type": "OutOfStock",
            "title": "Stock alert",
            "message": "Kayak is out of stock",
            "timestamp": "2024-05-01T10:00:00",
            "data": { "equipmentId": 12 }
        });

        let event = HubEvent::decode("ReceiveRoleNotification", vec![body]).unwrap();
        match event {
            HubEvent::Notification {
                scope,
                notification,
            } => {
                assert_eq!(scope, NotificationScope::Role);
                assert_eq!(notification.kind, "OutOfStock");
                assert_eq!(notification.payload["equipmentId"], 12);
                assert!(notification.timestamp.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_argument() {
        let err = HubEvent::decode("ChatEnded", vec![]).unwrap_err();
        assert!(matches!(err, RealtimeError::Decode(_)));
    }

    #[test]
    fn test_wrong_argument_type() {
        let err = HubEvent::decode("MessageRead", vec![json!("not-a-number")]).unwrap_err();
        assert!(err.to_string().contains("MessageRead"));
    }

    #[test]
    fn test_unknown_target_is_other() {
        let event = HubEvent::decode("StockUpdated", vec![json!({"id": 1})]).unwrap();
        assert_eq!(event.name(), "StockUpdated");
        assert!(matches!(event, HubEvent::Other { .. }));
    }
}
