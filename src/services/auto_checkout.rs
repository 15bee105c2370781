//! Client sessions and their auto-checkout monitors.
//!
//! Each open session owns a task that periodically checks whether its player has stayed
//! checked in past the configured TTL and, if so, checks them out. The sweep is best effort:
//! failures are logged and retried on the next tick.

use std::time::SystemTime;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::PlayerId,
    error::ServiceError,
    services::presence_service::{self, CheckOutOutcome},
    state::{PlayerSession, SharedState},
};

/// Public description of an open session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session id.
    pub id: Uuid,
    /// Player signed in on the client.
    pub player_id: PlayerId,
    /// Opening time.
    pub opened_at: SystemTime,
}

/// Open a session for an existing player and start its monitor.
///
/// A player has at most one session: opening a new one replaces (and cancels) the previous.
pub async fn open_session(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<SessionInfo, ServiceError> {
    let store = state.require_field_store().await?;
    if store.find_player(player_id.clone()).await?.is_none() {
        return Err(ServiceError::NotFound(format!("player {player_id}")));
    }

    let id = Uuid::new_v4();
    let opened_at = state.clock().now();
    let monitor = tokio::spawn(run_monitor(state.clone(), player_id.clone()));
    let session = PlayerSession::new(player_id.clone(), opened_at, monitor.abort_handle());
    if let Some(previous) = state.sessions().open(id, session) {
        debug!(
            player_id = %player_id,
            opened_at = ?previous.opened_at,
            "replaced previous session"
        );
    }
    info!(session_id = %id, player_id = %player_id, "session opened");

    Ok(SessionInfo {
        id,
        player_id,
        opened_at,
    })
}

/// Close a session, cancelling its monitor.
pub fn close_session(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    match state.sessions().close(id) {
        Some(session) => {
            info!(session_id = %id, player_id = %session.player_id, "session closed");
            Ok(())
        }
        None => Err(ServiceError::NotFound(format!("session {id}"))),
    }
}

/// Check `player_id` out if their presence has outlived the configured TTL.
pub async fn sweep_once(
    state: &SharedState,
    player_id: &PlayerId,
) -> Result<Option<CheckOutOutcome>, ServiceError> {
    let store = state.require_field_store().await?;
    let Some(player) = store.find_player(player_id.clone()).await? else {
        return Ok(None);
    };

    let now = state.clock().now();
    let ttl = state.config().presence.auto_checkout_after;
    let presence = player.value.presence;
    match presence.field_id() {
        Some(field_id) if presence.is_expired(now, ttl) => {
            info!(
                player_id = %player_id,
                field_id = %field_id,
                "presence expired; checking out"
            );
            presence_service::check_out(state, player_id.clone(), field_id)
                .await
                .map(Some)
        }
        _ => Ok(None),
    }
}

async fn run_monitor(state: SharedState, player_id: PlayerId) {
    let mut ticker = time::interval(state.config().presence.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(err) = sweep_once(&state, &player_id).await {
            warn!(player_id = %player_id, error = %err, "auto-checkout sweep failed");
        }
    }
}
