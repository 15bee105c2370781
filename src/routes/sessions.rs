use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::models::PlayerId,
    dto::session::{OpenSessionRequest, SessionResponse},
    error::AppError,
    services::auto_checkout,
    state::SharedState,
};

/// Routes opening and closing client sessions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/{id}", delete(close_session))
}

/// Open a client session; while it is open the player is checked out automatically once
/// their presence expires.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = OpenSessionRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionResponse),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn open_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<OpenSessionRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let info = auto_checkout::open_session(&state, PlayerId::new(payload.player_id)).await?;
    Ok(Json(info.into()))
}

/// Close a client session and stop its monitor.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auto_checkout::close_session(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}
