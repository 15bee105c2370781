use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod fields;
pub mod health;
pub mod players;
pub mod presence;
pub mod sessions;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(fields::router())
        .merge(presence::router())
        .merge(players::router())
        .merge(sessions::router())
        .merge(docs::router())
        .with_state(state)
}
