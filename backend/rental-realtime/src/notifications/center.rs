/// Notification Center
///
/// Client-side event log of classified notifications:
/// - Every inbound push event is classified, deduplicated and prepended
/// - History is bounded to the configured limit, oldest evicted first
/// - Every mutation is written through to [`NotificationStorage`]
///
/// Failures to reach the server are turned into local notifications instead
/// of errors.
use super::classifier::{classify_group, classify_priority};
use super::models::{Notification, NotificationGroup, NotificationPriority};
use super::storage::NotificationStorage;
use crate::endpoint::Endpoint;
use crate::hub::{names, ConnectionMultiplexer, HubEvent, PushNotification, SubscriptionId};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct CenterState {
    /// Most recent first
    notifications: Vec<Notification>,
    next_id: u64,
}

struct CenterInner {
    state: Mutex<CenterState>,
    storage: Arc<dyn NotificationStorage>,
    limit: usize,
}

#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

impl NotificationCenter {
    /// Seed from `storage`; an unreadable history starts empty.
    pub fn new(storage: Arc<dyn NotificationStorage>, limit: usize) -> Self {
        let limit = limit.max(1);
        let mut notifications = match storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "discarding unreadable notification history");
                Vec::new()
            }
        };
        notifications.truncate(limit);

        let next_id = notifications.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        info!(restored = notifications.len(), limit, "notification center ready");

        Self {
            inner: Arc::new(CenterInner {
                state: Mutex::new(CenterState {
                    notifications,
                    next_id,
                }),
                storage,
                limit,
            }),
        }
    }

    /// Classify and store `event`. Returns the new id, or `None` when the
    /// same server-stamped event is already held.
    pub fn handle(&self, event: PushNotification) -> Option<u64> {
        let group = classify_group(&event.kind);
        let priority = classify_priority(&event.kind, &event.payload);

        let mut state = self.inner.state.lock();

        if let Some(stamp) = event.timestamp {
            let duplicate = state.notifications.iter().any(|n| {
                n.timestamp == stamp
                    && n.kind == event.kind
                    && n.title == event.title
                    && n.message == event.message
            });
            if duplicate {
                debug!(kind = %event.kind, "duplicate notification ignored");
                return None;
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        state.notifications.insert(
            0,
            Notification {
                id,
                kind: event.kind,
                title: event.title,
                message: event.message,
                payload: event.payload,
                timestamp: event.timestamp.unwrap_or_else(Utc::now),
                read: false,
                group,
                priority,
            },
        );
        state.notifications.truncate(self.inner.limit);

        debug!(id, group = group.as_str(), priority = priority.as_str(), "notification stored");
        self.persist(&state.notifications);
        Some(id)
    }

    pub fn mark_read(&self, id: u64) -> bool {
        self.mutate(|notifications| match notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        })
    }

    /// Returns how many notifications changed.
    pub fn mark_all_read(&self) -> usize {
        self.mutate(|notifications| {
            let mut changed = 0;
            for n in notifications.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed += 1;
            }
            changed
        })
    }

    pub fn clear(&self, id: u64) -> bool {
        self.mutate(|notifications| {
            let before = notifications.len();
            notifications.retain(|n| n.id != id);
            notifications.len() != before
        })
    }

    pub fn clear_all(&self) {
        self.mutate(|notifications| notifications.clear());
    }

    /// Snapshot, most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state.lock().notifications.clone()
    }

    pub fn by_group(&self, group: NotificationGroup) -> Vec<Notification> {
        self.filtered(|n| n.group == group)
    }

    pub fn by_priority(&self, priority: NotificationPriority) -> Vec<Notification> {
        self.filtered(|n| n.priority == priority)
    }

    pub fn unread_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .count()
    }

    /// Feed notifications pushed on `endpoint` into the center.
    ///
    /// Attaches to the user, role and broadcast notification events, plus
    /// any `extra_events` the endpoint publishes without a dedicated type
    /// (equipment or feedback alerts, for example).
    pub fn listen(
        &self,
        hub: &ConnectionMultiplexer,
        endpoint: Endpoint,
        extra_events: &[&str],
    ) -> Vec<SubscriptionId> {
        names::NOTIFICATION_EVENTS
            .iter()
            .chain(extra_events.iter())
            .map(|name| {
                let center = self.clone();
                hub.on(endpoint, name, move |event| {
                    if let Some(notification) = as_notification(event) {
                        center.handle(notification);
                    }
                })
            })
            .collect()
    }

    /// Invoke `method` on the notification hub.
    ///
    /// Never fails: when the hub is not connected or the call is rejected, a
    /// high priority system notification is recorded and `false` returned.
    pub async fn send_to_server(
        &self,
        hub: &ConnectionMultiplexer,
        method: &str,
        arguments: Vec<Value>,
    ) -> bool {
        if !hub.is_connected(Endpoint::Notification) {
            warn!(method, "notification hub not connected");
            self.raise_failure(method, "notification channel is not connected");
            return false;
        }

        match hub.invoke(Endpoint::Notification, method, arguments).await {
            Ok(_) => true,
            Err(e) => {
                warn!(method, error = %e, "notification hub call failed");
                self.raise_failure(method, &e.to_string());
                false
            }
        }
    }

    fn raise_failure(&self, method: &str, reason: &str) {
        self.handle(PushNotification {
            kind: "Error".to_string(),
            title: "Notification delivery failed".to_string(),
            message: format!("{method}: {reason}"),
            timestamp: None,
            payload: json!({ "priority": "high", "method": method }),
        });
    }

    fn filtered<P>(&self, predicate: P) -> Vec<Notification>
    where
        P: Fn(&Notification) -> bool,
    {
        self.inner
            .state
            .lock()
            .notifications
            .iter()
            .filter(|n| predicate(n))
            .cloned()
            .collect()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Notification>) -> R) -> R {
        let mut state = self.inner.state.lock();
        let result = f(&mut state.notifications);
        self.persist(&state.notifications);
        result
    }

    fn persist(&self, notifications: &[Notification]) {
        if let Err(e) = self.inner.storage.save(notifications) {
            warn!(error = %e, "failed to persist notifications");
        }
    }
}

/// Notification carried by a hub event, if any.
fn as_notification(event: &HubEvent) -> Option<PushNotification> {
    match event {
        HubEvent::Notification { notification, .. } => Some(notification.clone()),
        HubEvent::Other { target, arguments } => {
            let first = arguments.first().cloned().unwrap_or(Value::Null);
            if let Ok(notification) = serde_json::from_value::<PushNotification>(first.clone()) {
                if !notification.kind.is_empty() {
                    return Some(notification);
                }
            }

            let message = match &first {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            Some(PushNotification {
                kind: target.clone(),
                title: target.clone(),
                message,
                timestamp: None,
                payload: first,
            })
        }
        _ => None,
    }
}
