use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dao::models::PlayerId,
    dto::presence::{CheckInResponse, CheckOutResponse, PresenceRequest},
    error::AppError,
    services::presence_service,
    state::SharedState,
};

/// Routes handling check-in and check-out.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/presence/check-in", post(check_in))
        .route("/presence/check-out", post(check_out))
}

/// Check a player into a field, leaving their current field in the same transaction.
#[utoipa::path(
    post,
    path = "/presence/check-in",
    tag = "presence",
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Confirmed check-in", body = CheckInResponse),
        (status = 404, description = "Unknown player or field"),
        (status = 409, description = "Transaction kept conflicting")
    )
)]
pub async fn check_in(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PresenceRequest>>,
) -> Result<Json<CheckInResponse>, AppError> {
    let outcome =
        presence_service::check_in(&state, PlayerId::new(payload.player_id), payload.field_id)
            .await?;
    Ok(Json(outcome.into()))
}

/// Check a player out of a field.
#[utoipa::path(
    post,
    path = "/presence/check-out",
    tag = "presence",
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Confirmed check-out", body = CheckOutResponse),
        (status = 404, description = "Unknown player"),
        (status = 409, description = "Transaction kept conflicting")
    )
)]
pub async fn check_out(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PresenceRequest>>,
) -> Result<Json<CheckOutResponse>, AppError> {
    let outcome =
        presence_service::check_out(&state, PlayerId::new(payload.player_id), payload.field_id)
            .await?;
    Ok(Json(outcome.into()))
}
