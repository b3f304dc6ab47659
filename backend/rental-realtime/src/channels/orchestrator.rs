/// Channel Orchestrator
///
/// Decides which endpoints an identity needs, opens them concurrently, runs
/// the per-channel registration calls and tracks the open set. An endpoint
/// is open only while it is a member of the tracked set.
use super::facades::{
    methods, ChatChannel, EquipmentChannel, FeedbackChannel, NotificationChannel, ScheduleChannel,
};
use super::Identity;
use crate::endpoint::Endpoint;
use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::{ConnectionMultiplexer, ConnectionState};
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of [`ChannelOrchestrator::initialize`], one entry per requested channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelReport {
    /// Channels with a live connection, registered or not
    pub connected: Vec<Endpoint>,
    /// Connected channels whose registration call failed
    pub unregistered: Vec<(Endpoint, RealtimeError)>,
    /// Channels still being reconnected; they stay in the open set
    pub degraded: Vec<Endpoint>,
    /// Requested channels that could not be opened, by requested name
    pub failed: Vec<(String, RealtimeError)>,
}

impl ChannelReport {
    pub fn is_complete(&self) -> bool {
        self.unregistered.is_empty() && self.degraded.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct ChannelSet {
    identity: Option<Identity>,
    open: BTreeSet<Endpoint>,
}

/// Registration calls `endpoint` needs once connected for `identity`.
pub fn registration_calls(endpoint: Endpoint, identity: &Identity) -> Vec<(&'static str, Vec<Value>)> {
    match endpoint {
        Endpoint::EquipmentCondition | Endpoint::EquipmentStock if identity.role.is_admin() => {
            vec![(methods::REGISTER_ADMIN_CONNECTION, vec![json!(identity.user_id)])]
        }
        Endpoint::Notification => vec![
            (methods::JOIN_ROLE_GROUP, vec![json!(identity.role.as_str())]),
            (methods::JOIN_USER_SPECIFIC_GROUP, vec![json!(identity.user_id)]),
        ],
        _ => Vec::new(),
    }
}

pub struct ChannelOrchestrator {
    hub: ConnectionMultiplexer,
    // Async mutex: initialize/teardown hold it across connects
    set: Mutex<ChannelSet>,
}

impl ChannelOrchestrator {
    pub fn new(hub: ConnectionMultiplexer) -> Self {
        Self {
            hub,
            set: Mutex::new(ChannelSet::default()),
        }
    }

    /// Open and register every requested channel for `identity`.
    ///
    /// Channels are opened concurrently; one failing does not abort the
    /// others. A different identity than the current one tears everything
    /// down first, and open channels missing from `channels` are closed.
    pub async fn initialize<S: AsRef<str>>(&self, identity: Identity, channels: &[S]) -> ChannelReport {
        let mut set = self.set.lock().await;

        if set.identity.is_some_and(|current| current != identity) {
            info!(user_id = identity.user_id, "identity changed, closing previous channels");
            self.close_all(&mut set).await;
        }
        set.identity = Some(identity);

        let mut report = ChannelReport::default();
        let mut requested = BTreeSet::new();
        for name in channels {
            match name.as_ref().parse::<Endpoint>() {
                Ok(endpoint) => {
                    requested.insert(endpoint);
                }
                Err(e) => {
                    warn!(channel = name.as_ref(), "unknown channel requested");
                    report.failed.push((name.as_ref().to_string(), e));
                }
            }
        }

        let stale: Vec<Endpoint> = set.open.difference(&requested).copied().collect();
        for endpoint in stale {
            debug!(endpoint = %endpoint, "closing channel no longer requested");
            if let Err(e) = self.hub.disconnect(endpoint).await {
                warn!(endpoint = %endpoint, error = %e, "failed to close channel");
            }
            set.open.remove(&endpoint);
        }

        let outcomes = join_all(
            requested
                .iter()
                .map(|endpoint| self.open_channel(*endpoint, identity)),
        )
        .await;

        for (endpoint, outcome) in requested.iter().zip(outcomes) {
            match outcome {
                Ok(registration) => {
                    set.open.insert(*endpoint);
                    report.connected.push(*endpoint);
                    if let Err(e) = registration {
                        report.unregistered.push((*endpoint, e));
                    }
                }
                // Keep owning a connection the multiplexer is still retrying
                Err(e) if self.hub.state(*endpoint) == ConnectionState::Reconnecting => {
                    debug!(endpoint = %endpoint, error = %e, "channel is reconnecting");
                    set.open.insert(*endpoint);
                    report.degraded.push(*endpoint);
                }
                Err(e) => {
                    set.open.remove(endpoint);
                    report.failed.push((endpoint.name().to_string(), e));
                }
            }
        }

        info!(
            user_id = identity.user_id,
            role = %identity.role,
            connected = report.connected.len(),
            unregistered = report.unregistered.len(),
            degraded = report.degraded.len(),
            failed = report.failed.len(),
            "channels initialized"
        );
        report
    }

    /// Disconnect every open channel and forget the identity.
    pub async fn teardown(&self) {
        let mut set = self.set.lock().await;
        self.close_all(&mut set).await;
        set.identity = None;
        info!("channels torn down");
    }

    pub async fn open_channels(&self) -> Vec<Endpoint> {
        self.set.lock().await.open.iter().copied().collect()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.set.lock().await.identity
    }

    pub fn hub(&self) -> &ConnectionMultiplexer {
        &self.hub
    }

    pub fn chat(&self) -> ChatChannel {
        ChatChannel::new(self.hub.clone())
    }

    pub fn feedback(&self) -> FeedbackChannel {
        FeedbackChannel::new(self.hub.clone())
    }

    pub fn equipment(&self) -> EquipmentChannel {
        EquipmentChannel::new(self.hub.clone())
    }

    pub fn equipment_condition(&self) -> EquipmentChannel {
        EquipmentChannel::condition(self.hub.clone())
    }

    pub fn equipment_stock(&self) -> EquipmentChannel {
        EquipmentChannel::stock(self.hub.clone())
    }

    pub fn schedule(&self) -> ScheduleChannel {
        ScheduleChannel::new(self.hub.clone())
    }

    pub fn notification(&self) -> NotificationChannel {
        NotificationChannel::new(self.hub.clone())
    }

    /// Connect, then register. The outer result is the connection, the inner
    /// one the registration.
    async fn open_channel(
        &self,
        endpoint: Endpoint,
        identity: Identity,
    ) -> RealtimeResult<RealtimeResult<()>> {
        if let Err(e) = self.hub.connect(endpoint).await {
            warn!(endpoint = %endpoint, error = %e, "channel connect failed");
            return Err(e);
        }

        for (method, arguments) in registration_calls(endpoint, &identity) {
            if let Err(e) = self.hub.invoke(endpoint, method, arguments).await {
                warn!(endpoint = %endpoint, method, error = %e, "channel registration failed");
                return Ok(Err(RealtimeError::RegistrationFailed {
                    endpoint,
                    reason: e.to_string(),
                }));
            }
        }

        debug!(endpoint = %endpoint, "channel ready");
        Ok(Ok(()))
    }

    async fn close_all(&self, set: &mut ChannelSet) {
        let endpoints: Vec<Endpoint> = set.open.iter().copied().collect();
        let results = join_all(endpoints.iter().map(|endpoint| self.hub.disconnect(*endpoint))).await;
        for (endpoint, result) in endpoints.iter().zip(results) {
            if let Err(e) = result {
                warn!(endpoint = %endpoint, error = %e, "failed to close channel");
            }
        }
        set.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Role;

    fn identity(role: Role) -> Identity {
        Identity::new(9, role).unwrap()
    }

    #[test]
    fn test_equipment_alerts_register_only_for_admins() {
        let admin = identity(Role::Admin);
        let staff = identity(Role::Staff);

        for endpoint in [Endpoint::EquipmentCondition, Endpoint::EquipmentStock] {
            assert_eq!(
                registration_calls(endpoint, &admin),
                vec![(methods::REGISTER_ADMIN_CONNECTION, vec![json!(9)])]
            );
            assert!(registration_calls(endpoint, &staff).is_empty());
        }
    }

    #[test]
    fn test_notification_joins_role_and_user_groups() {
        let calls = registration_calls(Endpoint::Notification, &identity(Role::Manager));
        assert_eq!(
            calls,
            vec![
                (methods::JOIN_ROLE_GROUP, vec![json!("Manager")]),
                (methods::JOIN_USER_SPECIFIC_GROUP, vec![json!(9)]),
            ]
        );
    }

    #[test]
    fn test_other_channels_need_no_registration() {
        let admin = identity(Role::Admin);
        for endpoint in [
            Endpoint::Chat,
            Endpoint::Equipment,
            Endpoint::Feedback,
            Endpoint::Schedule,
        ] {
            assert!(registration_calls(endpoint, &admin).is_empty());
        }
    }

    #[test]
    fn test_report_completeness() {
        let mut report = ChannelReport::default();
        assert!(report.is_complete());
        report.failed.push(("fax".into(), RealtimeError::UnknownChannel("fax".into())));
        assert!(!report.is_complete());

        let reconnecting = ChannelReport {
            degraded: vec![Endpoint::Chat],
            ..ChannelReport::default()
        };
        assert!(!reconnecting.is_complete());
    }
}
