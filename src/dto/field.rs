use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{
        ChatPointerEntity, FieldEntity, FieldId, FieldPlayerEntity, FieldSize, FieldStatus,
        PlayerId, ReviewEntity, SurfaceType, TournamentEntity,
    },
    dto::{format_system_time, validation::validate_not_blank},
    state::{catalog::FieldFilter, geo::Position},
};

/// Player listed as present on a field.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldPlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: String,
    /// RFC 3339 check-in time.
    pub check_in_time: Option<String>,
}

impl From<&FieldPlayerEntity> for FieldPlayerView {
    fn from(entry: &FieldPlayerEntity) -> Self {
        Self {
            player_id: entry.player_id.clone(),
            name: entry.name.clone(),
            avatar: entry.avatar.clone(),
            check_in_time: entry.check_in_time.map(format_system_time),
        }
    }
}

/// Review left on a field.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewView {
    pub id: String,
    pub author_id: PlayerId,
    pub author_name: String,
    pub author_avatar: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: String,
}

impl From<&ReviewEntity> for ReviewView {
    fn from(review: &ReviewEntity) -> Self {
        Self {
            id: review.id.clone(),
            author_id: review.author_id.clone(),
            author_name: review.author_name.clone(),
            author_avatar: review.author_avatar.clone(),
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: format_system_time(review.created_at),
        }
    }
}

/// Last chat message posted on a field.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatPointerView {
    pub message_id: String,
    pub author_id: PlayerId,
    pub author_name: String,
    pub text: String,
    pub sent_at: String,
}

impl From<&ChatPointerEntity> for ChatPointerView {
    fn from(pointer: &ChatPointerEntity) -> Self {
        Self {
            message_id: pointer.message_id.clone(),
            author_id: pointer.author_id.clone(),
            author_name: pointer.author_name.clone(),
            text: pointer.text.clone(),
            sent_at: format_system_time(pointer.sent_at),
        }
    }
}

/// Tournament hosted on a field. Attributes this service does not model are passed through
/// in `extra`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TournamentView {
    pub id: String,
    pub name: String,
    pub creator_id: Option<PlayerId>,
    pub status: String,
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl From<&TournamentEntity> for TournamentView {
    fn from(tournament: &TournamentEntity) -> Self {
        Self {
            id: tournament.id.clone(),
            name: tournament.name.clone(),
            creator_id: tournament.creator_id.clone(),
            status: tournament.status.clone(),
            extra: tournament.extra.clone(),
        }
    }
}

/// Field as exposed over HTTP and SSE.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldView {
    pub id: FieldId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub status: FieldStatus,
    pub surface: SurfaceType,
    pub lighting: bool,
    pub size: FieldSize,
    pub rating: f64,
    pub players: Vec<FieldPlayerView>,
    pub reviews: Vec<ReviewView>,
    pub last_message: Option<ChatPointerView>,
    pub photo: String,
    pub tournaments: Vec<TournamentView>,
}

impl From<&FieldEntity> for FieldView {
    fn from(field: &FieldEntity) -> Self {
        Self {
            id: field.id,
            name: field.name.clone(),
            lat: field.position.lat,
            lng: field.position.lng,
            status: field.status,
            surface: field.surface,
            lighting: field.lighting,
            size: field.size,
            rating: field.rating,
            players: field.players.iter().map(Into::into).collect(),
            reviews: field.reviews.iter().map(Into::into).collect(),
            last_message: field.last_message.as_ref().map(Into::into),
            photo: field.photo.clone(),
            tournaments: field.tournaments.iter().map(Into::into).collect(),
        }
    }
}

impl From<FieldEntity> for FieldView {
    fn from(field: FieldEntity) -> Self {
        Self::from(&field)
    }
}

/// Viewport search payload.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SearchFieldsRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    /// Search radius in meters; the configured default applies when omitted.
    #[validate(range(min = 1.0, max = 50000.0))]
    pub radius_m: Option<f64>,
}

impl SearchFieldsRequest {
    /// Search center.
    pub fn center(&self) -> Position {
        Position::new(self.lat, self.lng)
    }
}

/// Fields found by a search, plus a notice when part of them could not be persisted.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchFieldsResponse {
    pub fields: Vec<FieldView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Filters applied to the cached catalog view.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearbyQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[validate(range(min = 1.0, max = 50000.0))]
    pub radius_m: Option<f64>,
    /// Only show favorites of this player.
    pub favorites_of: Option<String>,
    pub min_players: Option<usize>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub min_rating: Option<f64>,
    pub has_tournaments: Option<bool>,
    pub open_only: Option<bool>,
    pub surface: Option<SurfaceType>,
    pub lit_only: Option<bool>,
    pub size: Option<FieldSize>,
}

impl NearbyQuery {
    /// Catalog filter for these parameters, ignoring `favorites_of` which needs a lookup.
    pub fn filter(&self) -> FieldFilter {
        FieldFilter {
            favorites: None,
            min_players: self.min_players.unwrap_or_default(),
            min_rating: self.min_rating.unwrap_or_default(),
            has_tournaments: self.has_tournaments.unwrap_or_default(),
            open_only: self.open_only.unwrap_or_default(),
            surface: self.surface,
            lit_only: self.lit_only.unwrap_or_default(),
            size: self.size,
        }
    }
}

/// User-submitted field.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitFieldRequest {
    #[validate(length(max = 120), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[serde(default)]
    pub surface: SurfaceType,
    #[serde(default)]
    pub lighting: bool,
    #[serde(default)]
    pub size: FieldSize,
    #[validate(url)]
    pub photo: Option<String>,
}

/// Review or rating left by a player.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReviewRequest {
    #[validate(length(min = 1))]
    pub player_id: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub comment: String,
}

/// New last-message pointer for a field chat.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatPointerRequest {
    #[validate(length(min = 1))]
    pub player_id: String,
    #[validate(length(min = 1))]
    pub message_id: String,
    #[validate(length(max = 2000), custom(function = "validate_not_blank"))]
    pub text: String,
}
