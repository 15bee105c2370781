use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::FieldId,
    dto::{field::FieldView, player::PlayerView},
    services::presence_service::{CheckInOutcome, CheckOutOutcome},
};

/// Player and field of a presence transition.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PresenceRequest {
    #[validate(length(min = 1))]
    pub player_id: String,
    pub field_id: FieldId,
}

/// Confirmed state after a check-in.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckInResponse {
    pub player: PlayerView,
    pub field: FieldView,
    /// Field left by a switch, when it still exists.
    pub left_field: Option<FieldView>,
    /// False when the player was already checked into the field.
    pub changed: bool,
    /// Documents referenced by the player that no longer exist.
    pub stale_references: Vec<String>,
}

impl From<CheckInOutcome> for CheckInResponse {
    fn from(outcome: CheckInOutcome) -> Self {
        Self {
            player: outcome.player.into(),
            field: outcome.field.into(),
            left_field: outcome.left.map(Into::into),
            changed: outcome.changed,
            stale_references: outcome
                .stale_references
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Confirmed state after a check-out.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckOutResponse {
    pub player: PlayerView,
    /// Field named by the request, when it still exists.
    pub field: Option<FieldView>,
    /// Whether the session counted as a visit.
    pub visit_credited: bool,
    /// Session length in seconds, when the player was checked in.
    pub duration_secs: Option<u64>,
    pub stale_references: Vec<String>,
}

impl From<CheckOutOutcome> for CheckOutResponse {
    fn from(outcome: CheckOutOutcome) -> Self {
        Self {
            player: outcome.player.into(),
            field: outcome.field.map(Into::into),
            visit_credited: outcome.visit_credited,
            duration_secs: outcome.duration.map(|duration| duration.as_secs()),
            stale_references: outcome
                .stale_references
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}
