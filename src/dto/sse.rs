use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::{field::FieldView, player::PlayerView};

/// Event fanned out to every client of the public update stream.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    /// SSE event name such as `field.updated`; unnamed events are plain messages.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Event with an already serialised data field.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode, and sent to every client as
/// the first event of its stream.
pub struct SystemStatus {
    /// Whether storage-backed requests are currently refused.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent to a client that fell behind the stream; its cached fields and players may be stale.
pub struct StreamLagged {
    /// Updates skipped for this client.
    pub missed: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a field change has been confirmed by storage.
pub struct FieldUpdatedEvent {
    /// Field as stored after the change.
    pub field: FieldView,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a player change has been confirmed by storage.
pub struct PlayerUpdatedEvent {
    /// Player as stored after the change.
    pub player: PlayerView,
}
