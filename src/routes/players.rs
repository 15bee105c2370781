use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::{FieldId, PlayerId},
    dto::{
        field::FieldView,
        player::{
            FavoriteToggleResponse, FriendshipResponse, PlayerSummary, PlayerView,
            UpsertPlayerRequest,
        },
    },
    error::AppError,
    services::{
        community_service,
        player_service::{self, ProfileUpdate},
        social_service::{self, FriendAction},
    },
    state::SharedState,
};

/// Routes handling player profiles, favorites and the friend graph.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players/{id}", get(get_player).put(upsert_player))
        .route("/players/{id}/favorites", get(list_favorites))
        .route("/players/{id}/favorites/{field_id}", post(toggle_favorite))
        .route("/players/{id}/friends", get(list_friends))
        .route("/players/{id}/friend-requests", get(list_friend_requests))
        .route("/players/{id}/friends/{other}", delete(remove_friend))
        .route("/players/{id}/friends/{other}/request", post(request_friend))
        .route("/players/{id}/friends/{other}/accept", post(accept_friend))
        .route("/players/{id}/friends/{other}/decline", post(decline_friend))
}

/// Create a player profile or update its attributes.
#[utoipa::path(
    put,
    path = "/players/{id}",
    tag = "players",
    params(("id" = String, Path, description = "Player identifier")),
    request_body = UpsertPlayerRequest,
    responses((status = 200, description = "Stored profile", body = PlayerView))
)]
pub async fn upsert_player(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<UpsertPlayerRequest>>,
) -> Result<Json<PlayerView>, AppError> {
    let update = ProfileUpdate {
        name: payload.name,
        handle: payload.handle,
        email: payload.email,
        avatar: payload.avatar,
    };
    let player = player_service::upsert_player(&state, PlayerId::new(id), update).await?;
    Ok(Json(player.into()))
}

/// Read a player profile.
#[utoipa::path(
    get,
    path = "/players/{id}",
    tag = "players",
    params(("id" = String, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Profile", body = PlayerView),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn get_player(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerView>, AppError> {
    let player = player_service::get_player(&state, PlayerId::new(id)).await?;
    Ok(Json(player.into()))
}

/// Add or remove a favorite field.
#[utoipa::path(
    post,
    path = "/players/{id}/favorites/{field_id}",
    tag = "players",
    params(
        ("id" = String, Path, description = "Player identifier"),
        ("field_id" = i64, Path, description = "Field identifier")
    ),
    responses(
        (status = 200, description = "Favorite state after the toggle", body = FavoriteToggleResponse)
    )
)]
pub async fn toggle_favorite(
    State(state): State<SharedState>,
    Path((id, field_id)): Path<(String, FieldId)>,
) -> Result<Json<FavoriteToggleResponse>, AppError> {
    let (_, favorite) =
        community_service::toggle_favorite(&state, PlayerId::new(id), field_id).await?;
    Ok(Json(FavoriteToggleResponse { field_id, favorite }))
}

/// Favorite fields of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/favorites",
    tag = "players",
    params(("id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "Favorite fields", body = [FieldView]))
)]
pub async fn list_favorites(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FieldView>>, AppError> {
    let fields = community_service::favorites(&state, PlayerId::new(id)).await?;
    Ok(Json(fields.iter().map(FieldView::from).collect()))
}

/// Confirmed friends of a player.
#[utoipa::path(
    get,
    path = "/players/{id}/friends",
    tag = "players",
    params(("id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "Friends", body = [PlayerSummary]))
)]
pub async fn list_friends(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PlayerSummary>>, AppError> {
    let players = social_service::friends(&state, PlayerId::new(id)).await?;
    Ok(Json(players.iter().map(PlayerSummary::from).collect()))
}

/// Players with a pending friend request to this player.
#[utoipa::path(
    get,
    path = "/players/{id}/friend-requests",
    tag = "players",
    params(("id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "Pending requesters", body = [PlayerSummary]))
)]
pub async fn list_friend_requests(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PlayerSummary>>, AppError> {
    let players = social_service::friend_requests(&state, PlayerId::new(id)).await?;
    Ok(Json(players.iter().map(PlayerSummary::from).collect()))
}

/// Send a friend request; accepts a pending request from the other player.
#[utoipa::path(
    post,
    path = "/players/{id}/friends/{other}/request",
    tag = "players",
    params(
        ("id" = String, Path, description = "Acting player"),
        ("other" = String, Path, description = "Other player")
    ),
    responses((status = 200, description = "Resulting relation", body = FriendshipResponse))
)]
pub async fn request_friend(
    state: State<SharedState>,
    path: Path<(String, String)>,
) -> Result<Json<FriendshipResponse>, AppError> {
    friend_action(state, path, FriendAction::Request).await
}

/// Accept a pending friend request.
#[utoipa::path(
    post,
    path = "/players/{id}/friends/{other}/accept",
    tag = "players",
    params(
        ("id" = String, Path, description = "Acting player"),
        ("other" = String, Path, description = "Requesting player")
    ),
    responses(
        (status = 200, description = "Resulting relation", body = FriendshipResponse),
        (status = 409, description = "No pending request")
    )
)]
pub async fn accept_friend(
    state: State<SharedState>,
    path: Path<(String, String)>,
) -> Result<Json<FriendshipResponse>, AppError> {
    friend_action(state, path, FriendAction::Accept).await
}

/// Decline a pending friend request.
#[utoipa::path(
    post,
    path = "/players/{id}/friends/{other}/decline",
    tag = "players",
    params(
        ("id" = String, Path, description = "Acting player"),
        ("other" = String, Path, description = "Requesting player")
    ),
    responses(
        (status = 200, description = "Resulting relation", body = FriendshipResponse),
        (status = 409, description = "No pending request")
    )
)]
pub async fn decline_friend(
    state: State<SharedState>,
    path: Path<(String, String)>,
) -> Result<Json<FriendshipResponse>, AppError> {
    friend_action(state, path, FriendAction::Decline).await
}

/// Remove a friend, cancelling any pending request between the two players.
#[utoipa::path(
    delete,
    path = "/players/{id}/friends/{other}",
    tag = "players",
    params(
        ("id" = String, Path, description = "Acting player"),
        ("other" = String, Path, description = "Other player")
    ),
    responses((status = 200, description = "Resulting relation", body = FriendshipResponse))
)]
pub async fn remove_friend(
    state: State<SharedState>,
    path: Path<(String, String)>,
) -> Result<Json<FriendshipResponse>, AppError> {
    friend_action(state, path, FriendAction::Remove).await
}

async fn friend_action(
    State(state): State<SharedState>,
    Path((id, other)): Path<(String, String)>,
    action: FriendAction,
) -> Result<Json<FriendshipResponse>, AppError> {
    let player_id = PlayerId::new(id);
    let other_id = PlayerId::new(other);
    let relation =
        social_service::apply(&state, player_id.clone(), other_id.clone(), action).await?;
    Ok(Json(FriendshipResponse {
        player_id,
        other_id,
        relation,
    }))
}
