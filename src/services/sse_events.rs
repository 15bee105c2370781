use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{FieldEntity, PlayerEntity},
    dto::sse::{FieldUpdatedEvent, PlayerUpdatedEvent, ServerEvent, StreamLagged, SystemStatus},
    state::AppState,
};

const EVENT_FIELD_UPDATED: &str = "field.updated";
const EVENT_PLAYER_UPDATED: &str = "player.updated";
const EVENT_SYSTEM_STATUS: &str = "system.status";
const EVENT_STREAM_LAGGED: &str = "stream.lagged";

/// Broadcast a storage-confirmed field record.
pub fn broadcast_field_updated(state: &AppState, field: &FieldEntity) {
    let payload = FieldUpdatedEvent {
        field: field.into(),
    };
    send_public_event(state, EVENT_FIELD_UPDATED, &payload);
}

/// Broadcast a storage-confirmed player record.
pub fn broadcast_player_updated(state: &AppState, player: &PlayerEntity) {
    let payload = PlayerUpdatedEvent {
        player: player.into(),
    };
    send_public_event(state, EVENT_PLAYER_UPDATED, &payload);
}

/// Broadcast that the backend entered or left degraded mode.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Current degraded flag as a single-client `system.status` event.
pub fn system_status(degraded: bool) -> Option<ServerEvent> {
    named_event(EVENT_SYSTEM_STATUS, &SystemStatus { degraded })
}

/// Notice telling one client that `missed` updates were skipped.
pub fn stream_lagged(missed: u64) -> Option<ServerEvent> {
    named_event(EVENT_STREAM_LAGGED, &StreamLagged { missed })
}

fn send_public_event(state: &AppState, event: &str, payload: &impl Serialize) {
    if let Some(event) = named_event(event, payload) {
        state.public_sse().broadcast(event);
    }
}

fn named_event(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    ServerEvent::json(Some(event.to_string()), payload)
        .inspect_err(|err| warn!(event, error = %err, "failed to serialize SSE payload"))
        .ok()
}
