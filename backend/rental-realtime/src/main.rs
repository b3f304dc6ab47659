use anyhow::Context;
use rental_realtime::{
    auth::StaticToken,
    channels::Identity,
    config::Config,
    hub::names,
    logging,
    state::RealtimeState,
    Endpoint,
};
use std::env;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    let identity = Identity::parse(
        env::var("RENTAL_USER_ID").ok().as_deref(),
        &env::var("RENTAL_ROLE").unwrap_or_else(|_| "Admin".to_string()),
    )
    .context("RENTAL_USER_ID / RENTAL_ROLE")?;

    let channels: Vec<String> = match env::var("RENTAL_CHANNELS") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Endpoint::ALL.iter().map(|e| e.name().to_string()).collect(),
    };

    let tokens = Arc::new(StaticToken::new(config.access_token.clone().unwrap_or_default()));
    let state = RealtimeState::from_config(config, tokens).context("building realtime services")?;

    let mut changes = state.hub.subscribe_state();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => info!(endpoint = %change.endpoint, state = ?change.state, "connection state changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "connection state updates lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for endpoint in Endpoint::ALL {
        state.notifications.listen(&state.hub, endpoint, &[]);
    }

    let report = state.channels.initialize(identity, &channels).await;
    for (endpoint, e) in &report.unregistered {
        warn!(endpoint = %endpoint, error = %e, "channel connected without registration");
    }
    for endpoint in &report.degraded {
        warn!(endpoint = %endpoint, "channel reconnecting");
    }
    for (name, e) in &report.failed {
        warn!(channel = %name, error = %e, "channel unavailable");
    }

    if report.connected.contains(&Endpoint::Chat) {
        match state.chat.connect(identity).await {
            Ok(()) => info!(sessions = state.chat.sessions().len(), "chat ready"),
            Err(e) => warn!(error = %e, "chat unavailable"),
        }
    }

    let chat = state.chat.clone();
    state.hub.on(Endpoint::Chat, names::RECEIVE_MESSAGE, move |event| {
        info!(event = event.name(), sessions = chat.sessions().len(), "chat activity");
    });

    info!(
        user_id = identity.user_id,
        role = %identity.role,
        connected = report.connected.len(),
        "rental-realtime running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    info!(
        unread_notifications = state.notifications.unread_count(),
        "shutting down"
    );
    state.shutdown().await;
    Ok(())
}
