use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::PlayerId, dto::format_system_time, services::auto_checkout::SessionInfo,
};

/// Request opening a client session for a signed-in player.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OpenSessionRequest {
    #[validate(length(min = 1))]
    pub player_id: String,
}

/// Open client session; its auto-checkout monitor runs until it is closed.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub player_id: PlayerId,
    pub opened_at: String,
}

impl From<SessionInfo> for SessionResponse {
    fn from(info: SessionInfo) -> Self {
        Self {
            session_id: info.id,
            player_id: info.player_id,
            opened_at: format_system_time(info.opened_at),
        }
    }
}
