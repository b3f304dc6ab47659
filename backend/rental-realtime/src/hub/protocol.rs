/// Hub wire protocol (JSON text frames terminated by 0x1E)
///
/// Frame flow:
/// 1. Client sends the handshake request, server answers `{}` or `{"error": ...}`
/// 2. Either side sends invocation records (`type` 1)
/// 3. The server answers client invocations with completion records (`type` 3)
/// 4. Pings (`type` 6) keep the socket alive, close (`type` 7) ends it
use crate::error::{RealtimeError, RealtimeResult};
use serde::Deserialize;
use serde_json::{json, Value};

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const STREAM_INVOCATION: u8 = 4;
const CANCEL_INVOCATION: u8 = 5;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    result: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

/// Handshake request sent right after the socket opens.
pub fn handshake_request() -> String {
    format!(
        "{}{}",
        json!({ "protocol": "json", "version": 1 }),
        RECORD_SEPARATOR
    )
}

/// Split off and validate the handshake response at the head of `text`.
///
/// Returns whatever follows the handshake record; servers may pack the first
/// invocations into the same frame.
pub fn parse_handshake(text: &str) -> RealtimeResult<&str> {
    let (head, rest) = text
        .split_once(RECORD_SEPARATOR)
        .ok_or_else(|| RealtimeError::Transport("incomplete handshake response".into()))?;

    let response: HandshakeResponse = serde_json::from_str(head)?;
    match response.error {
        Some(error) => Err(RealtimeError::Transport(format!("handshake rejected: {error}"))),
        None => Ok(rest),
    }
}

/// Decode every record in a text frame. Unknown or server-only record types
/// are skipped.
pub fn parse_frames(text: &str) -> Vec<RealtimeResult<HubMessage>> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| match serde_json::from_str::<RawMessage>(record) {
            Ok(raw) => raw.into_message().transpose(),
            Err(e) => Some(Err(RealtimeError::Decode(e.to_string()))),
        })
        .collect()
}

impl RawMessage {
    fn into_message(self) -> RealtimeResult<Option<HubMessage>> {
        let message = match self.kind {
            INVOCATION => HubMessage::Invocation {
                invocation_id: self.invocation_id,
                target: self
                    .target
                    .ok_or_else(|| RealtimeError::Decode("invocation without target".into()))?,
                arguments: self.arguments,
            },
            COMPLETION => HubMessage::Completion {
                invocation_id: self
                    .invocation_id
                    .ok_or_else(|| RealtimeError::Decode("completion without invocationId".into()))?,
                result: self.result,
                error: self.error,
            },
            PING => HubMessage::Ping,
            CLOSE => HubMessage::Close {
                error: self.error,
                allow_reconnect: self.allow_reconnect,
            },
            STREAM_ITEM | STREAM_INVOCATION | CANCEL_INVOCATION => return Ok(None),
            other => {
                return Err(RealtimeError::Decode(format!(
                    "unknown hub message type {other}"
                )))
            }
        };
        Ok(Some(message))
    }
}

/// Encode a single record, separator included.
pub fn encode(message: &HubMessage) -> String {
    let body = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            let mut body = json!({
                "type": INVOCATION,
                "target": target,
                "arguments": arguments,
            });
            if let Some(id) = invocation_id {
                body["invocationId"] = json!(id);
            }
            body
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            let mut body = json!({ "type": COMPLETION, "invocationId": invocation_id });
            if let Some(result) = result {
                body["result"] = result.clone();
            }
            if let Some(error) = error {
                body["error"] = json!(error);
            }
            body
        }
        HubMessage::Ping => json!({ "type": PING }),
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            let mut body = json!({ "type": CLOSE, "allowReconnect": allow_reconnect });
            if let Some(error) = error {
                body["error"] = json!(error);
            }
            body
        }
    };
    format!("{}{}", body, RECORD_SEPARATOR)
}
