use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{FieldId, FriendRelation, PlayerEntity, PlayerId, PlayerStats},
    dto::{format_system_time, validation::validate_not_blank},
};

/// Full player profile.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub handle: String,
    pub email: String,
    pub avatar: String,
    pub join_date: String,
    pub stats: PlayerStats,
    pub favorite_fields: Vec<FieldId>,
    pub friends: Vec<PlayerId>,
    pub friend_requests_sent: Vec<PlayerId>,
    pub friend_requests_received: Vec<PlayerId>,
    /// Field the player is checked into.
    pub current_field_id: Option<FieldId>,
    /// RFC 3339 check-in time; set exactly when `current_field_id` is.
    pub check_in_time: Option<String>,
    pub rating: u32,
    pub level: u32,
    pub experience: u32,
    pub achievements: Vec<String>,
}

impl From<&PlayerEntity> for PlayerView {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            handle: player.handle.clone(),
            email: player.email.clone(),
            avatar: player.avatar.clone(),
            join_date: format_system_time(player.join_date),
            stats: player.stats,
            favorite_fields: player.favorite_fields.clone(),
            friends: player.friends.clone(),
            friend_requests_sent: player.friend_requests_sent.clone(),
            friend_requests_received: player.friend_requests_received.clone(),
            current_field_id: player.presence.field_id(),
            check_in_time: player.presence.since().map(format_system_time),
            rating: player.rating,
            level: player.level,
            experience: player.experience,
            achievements: player.achievements.clone(),
        }
    }
}

impl From<PlayerEntity> for PlayerView {
    fn from(player: PlayerEntity) -> Self {
        Self::from(&player)
    }
}

/// Public card shown in friend lists.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub handle: String,
    pub avatar: String,
    pub level: u32,
    pub current_field_id: Option<FieldId>,
}

impl From<&PlayerEntity> for PlayerSummary {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            handle: player.handle.clone(),
            avatar: player.avatar.clone(),
            level: player.level,
            current_field_id: player.presence.field_id(),
        }
    }
}

/// Profile attributes to create or change. Omitted attributes keep their value.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpsertPlayerRequest {
    #[validate(length(max = 64), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 32), custom(function = "validate_not_blank"))]
    pub handle: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(url)]
    pub avatar: Option<String>,
}

/// Result of toggling a favorite.
#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteToggleResponse {
    pub field_id: FieldId,
    /// Whether the field is a favorite after the toggle.
    pub favorite: bool,
}

/// Relation between two players after a friend-graph operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct FriendshipResponse {
    pub player_id: PlayerId,
    pub other_id: PlayerId,
    pub relation: FriendRelation,
}
