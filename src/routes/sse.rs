use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "`system.status` snapshot, then `field.updated`, `player.updated`, `system.status` and `stream.lagged` events", content_type = "text/event-stream", body = String))
)]
/// Stream storage-confirmed field and player changes to a map client.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = sse_service::subscribe_updates(&state);
    info!(degraded = state.is_degraded(), "update stream client connected");
    sse_service::into_sse(subscription)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/public", get(public_stream))
}
