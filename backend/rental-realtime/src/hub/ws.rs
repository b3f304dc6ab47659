/// WebSocket transport for the hub protocol
use super::protocol::{self, HubMessage};
use super::transport::{HubConnector, HubLink, HubSession, TransportEvent};
use crate::error::{RealtimeError, RealtimeResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use resilience::with_timeout;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

type PendingCompletions = Arc<DashMap<String, oneshot::Sender<RealtimeResult<Value>>>>;

/// Opens hub connections over `ws://` / `wss://`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    handshake_timeout: Duration,
    keepalive_interval: Duration,
}

impl WebSocketConnector {
    pub fn new(handshake_timeout: Duration, keepalive_interval: Duration) -> Self {
        Self {
            handshake_timeout,
            keepalive_interval,
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(15))
    }
}

/// `http(s)://host/hubs/chat` -> `ws(s)://host/hubs/chat?access_token=...`
fn socket_url(url: &str, access_token: &str) -> String {
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    };
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}access_token={}",
        urlencoding::encode(access_token)
    )
}

#[async_trait]
impl HubConnector for WebSocketConnector {
    async fn connect(&self, url: &str, access_token: &str) -> RealtimeResult<HubSession> {
        let mut request = socket_url(url, access_token).into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| RealtimeError::Transport(format!("invalid token header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = connect_async(request).await?;
        let (mut sink, mut source) = stream.split();

        sink.send(Message::text(protocol::handshake_request())).await?;

        let first = with_timeout("hub handshake", self.handshake_timeout, source.next()).await?;
        let leftover = match first {
            Some(Ok(Message::Text(text))) => protocol::parse_handshake(text.as_str())?.to_string(),
            Some(Ok(other)) => {
                return Err(RealtimeError::Transport(format!(
                    "unexpected handshake frame: {other:?}"
                )))
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(RealtimeError::Transport(
                    "socket closed during handshake".into(),
                ))
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let pending: PendingCompletions = Arc::new(DashMap::new());

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("hub writer stopped: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            if !leftover.is_empty() && !route_frame(&leftover, &events_tx, &reader_pending) {
                fail_pending(&reader_pending);
                return;
            }

            let mut close_error = None;
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if !route_frame(text.as_str(), &events_tx, &reader_pending) {
                            fail_pending(&reader_pending);
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        close_error = frame
                            .filter(|f| f.code != CloseCode::Normal)
                            .map(|f| format!("closed by server: {} {}", f.code, f.reason));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        close_error = Some(e.to_string());
                        break;
                    }
                }
            }

            fail_pending(&reader_pending);
            let _ = events_tx.send(TransportEvent::Closed { error: close_error });
        });

        let keepalive_tx = outbound_tx.clone();
        let interval = self.keepalive_interval;
        let keepalive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if keepalive_tx
                    .send(Message::text(protocol::encode(&HubMessage::Ping)))
                    .is_err()
                {
                    break;
                }
            }
        });

        let link = WebSocketLink {
            outbound: outbound_tx,
            pending,
            next_invocation: AtomicU64::new(1),
            tasks: Mutex::new(vec![reader, keepalive]),
            writer: Mutex::new(Some(writer)),
        };

        Ok(HubSession {
            link: Arc::new(link),
            events: events_rx,
        })
    }
}

/// Returns `false` when the server asked to close the connection.
fn route_frame(
    text: &str,
    events: &mpsc::UnboundedSender<TransportEvent>,
    pending: &PendingCompletions,
) -> bool {
    for message in protocol::parse_frames(text) {
        match message {
            Ok(HubMessage::Invocation {
                target, arguments, ..
            }) => {
                let _ = events.send(TransportEvent::Invocation { target, arguments });
            }
            Ok(HubMessage::Completion {
                invocation_id,
                result,
                error,
            }) => {
                if let Some((_, waiter)) = pending.remove(&invocation_id) {
                    let outcome = match error {
                        Some(error) => Err(RealtimeError::Application(error)),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = waiter.send(outcome);
                } else {
                    debug!(invocation_id = %invocation_id, "completion for unknown invocation");
                }
            }
            Ok(HubMessage::Ping) => {}
            Ok(HubMessage::Close { error, .. }) => {
                let _ = events.send(TransportEvent::Closed { error });
                return false;
            }
            Err(e) => warn!("dropping malformed hub record: {}", e),
        }
    }
    true
}

fn fail_pending(pending: &PendingCompletions) {
    let ids: Vec<String> = pending.iter().map(|entry| entry.key().clone()).collect();
    for id in ids {
        if let Some((_, waiter)) = pending.remove(&id) {
            let _ = waiter.send(Err(RealtimeError::Transport(
                "connection closed before completion".into(),
            )));
        }
    }
}

/// Removes a pending completion when its invocation ends, however it ends.
struct PendingGuard<'a> {
    pending: &'a PendingCompletions,
    invocation_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.invocation_id);
    }
}

struct WebSocketLink {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingCompletions,
    next_invocation: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl HubLink for WebSocketLink {
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> RealtimeResult<Value> {
        let invocation_id = self
            .next_invocation
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(invocation_id.clone(), tx);
        // Also covers the caller dropping this future on timeout
        let _pending = PendingGuard {
            pending: &self.pending,
            invocation_id: &invocation_id,
        };

        let record = protocol::encode(&HubMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: target.to_string(),
            arguments,
        });

        if self.outbound.send(Message::text(record)).is_err() {
            return Err(RealtimeError::Transport("connection is closed".into()));
        }

        rx.await.unwrap_or_else(|_| {
            Err(RealtimeError::Transport(
                "connection closed before completion".into(),
            ))
        })
    }

    async fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        fail_pending(&self.pending);

        let _ = self.outbound.send(Message::Close(None));
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if with_timeout("hub close", Duration::from_secs(2), writer)
                .await
                .is_err()
            {
                debug!("hub writer did not finish closing in time");
            }
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
    }
}
