use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::{FieldId, PlayerId},
    dto::field::{
        ChatPointerRequest, FieldView, NearbyQuery, ReviewRequest, SearchFieldsRequest,
        SearchFieldsResponse, SubmitFieldRequest,
    },
    error::AppError,
    services::{
        catalog_service::{self, FieldSubmission},
        community_service::{self, ChatMessage, ReviewDraft},
    },
    state::{SharedState, geo::Position},
};

/// Routes serving the field catalog and its community features.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/fields", post(submit_field))
        .route("/fields/search", post(search_fields))
        .route("/fields/nearby", get(nearby_fields))
        .route("/fields/recent-chats", get(recent_chats))
        .route("/fields/{id}", get(get_field))
        .route("/fields/{id}/reviews", post(review_field))
        .route("/fields/{id}/chat", post(post_chat_pointer))
}

/// Search the geodata provider around a point and reconcile the results with stored state.
#[utoipa::path(
    post,
    path = "/fields/search",
    tag = "fields",
    request_body = SearchFieldsRequest,
    responses(
        (status = 200, description = "Fields found", body = SearchFieldsResponse),
        (status = 503, description = "Geodata provider or storage unavailable")
    )
)]
pub async fn search_fields(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SearchFieldsRequest>>,
) -> Result<Json<SearchFieldsResponse>, AppError> {
    let radius_m = payload
        .radius_m
        .unwrap_or(state.config().geodata.default_radius_m);
    let outcome = catalog_service::fetch_fields(&state, payload.center(), radius_m).await?;
    Ok(Json(SearchFieldsResponse {
        fields: outcome.fields.iter().map(FieldView::from).collect(),
        notice: outcome.notice,
    }))
}

/// List cached catalog entries around a point, nearest first.
#[utoipa::path(
    get,
    path = "/fields/nearby",
    tag = "fields",
    params(NearbyQuery),
    responses((status = 200, description = "Matching fields", body = [FieldView]))
)]
pub async fn nearby_fields(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<NearbyQuery>>,
) -> Result<Json<Vec<FieldView>>, AppError> {
    let radius_m = query
        .radius_m
        .unwrap_or(state.config().geodata.default_radius_m);
    let favorites_of = query.favorites_of.clone().map(PlayerId::new);
    let fields = catalog_service::nearby(
        &state,
        Position::new(query.lat, query.lng),
        radius_m,
        query.filter(),
        favorites_of,
    )
    .await?;
    Ok(Json(fields.iter().map(FieldView::from).collect()))
}

/// Submit a field missing from the provider data.
#[utoipa::path(
    post,
    path = "/fields",
    tag = "fields",
    request_body = SubmitFieldRequest,
    responses(
        (status = 200, description = "Field created", body = FieldView),
        (status = 400, description = "Invalid submission")
    )
)]
pub async fn submit_field(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SubmitFieldRequest>>,
) -> Result<Json<FieldView>, AppError> {
    let submission = FieldSubmission {
        name: payload.name,
        position: Position::new(payload.lat, payload.lng),
        surface: payload.surface,
        lighting: payload.lighting,
        size: payload.size,
        photo: payload.photo,
    };
    let field = catalog_service::submit_field(&state, submission).await?;
    Ok(Json(field.into()))
}

/// Read one field from storage.
#[utoipa::path(
    get,
    path = "/fields/{id}",
    tag = "fields",
    params(("id" = i64, Path, description = "Field identifier")),
    responses(
        (status = 200, description = "Field", body = FieldView),
        (status = 404, description = "Unknown field")
    )
)]
pub async fn get_field(
    State(state): State<SharedState>,
    Path(id): Path<FieldId>,
) -> Result<Json<FieldView>, AppError> {
    let field = catalog_service::get_field(&state, id).await?;
    Ok(Json(field.into()))
}

/// Review and rate a field.
#[utoipa::path(
    post,
    path = "/fields/{id}/reviews",
    tag = "fields",
    params(("id" = i64, Path, description = "Field identifier")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Field with updated rating", body = FieldView),
        (status = 404, description = "Unknown field or player")
    )
)]
pub async fn review_field(
    State(state): State<SharedState>,
    Path(id): Path<FieldId>,
    Valid(Json(payload)): Valid<Json<ReviewRequest>>,
) -> Result<Json<FieldView>, AppError> {
    let review = ReviewDraft {
        rating: payload.rating,
        comment: payload.comment,
    };
    let field =
        community_service::review_field(&state, id, PlayerId::new(payload.player_id), review)
            .await?;
    Ok(Json(field.into()))
}

/// Point a field's chat at its newest message.
#[utoipa::path(
    post,
    path = "/fields/{id}/chat",
    tag = "fields",
    params(("id" = i64, Path, description = "Field identifier")),
    request_body = ChatPointerRequest,
    responses(
        (status = 200, description = "Field with updated chat pointer", body = FieldView),
        (status = 404, description = "Unknown field or player")
    )
)]
pub async fn post_chat_pointer(
    State(state): State<SharedState>,
    Path(id): Path<FieldId>,
    Valid(Json(payload)): Valid<Json<ChatPointerRequest>>,
) -> Result<Json<FieldView>, AppError> {
    let message = ChatMessage {
        message_id: payload.message_id,
        text: payload.text,
    };
    let field =
        community_service::post_chat_pointer(&state, id, PlayerId::new(payload.player_id), message)
            .await?;
    Ok(Json(field.into()))
}

/// Fields with the most recent chat activity.
#[utoipa::path(
    get,
    path = "/fields/recent-chats",
    tag = "fields",
    responses((status = 200, description = "Recently chatted fields", body = [FieldView]))
)]
pub async fn recent_chats(
    State(state): State<SharedState>,
) -> Result<Json<Vec<FieldView>>, AppError> {
    let fields = catalog_service::recent_chats(&state).await?;
    Ok(Json(fields.iter().map(FieldView::from).collect()))
}
