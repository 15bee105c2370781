use tracing::warn;

use crate::{
    dto::health::{HealthResponse, ServiceStatus, StorageHealth},
    state::SharedState,
};

/// Ping the field store and summarize whether the backend can serve field traffic.
///
/// The ping result is reported but does not flip degraded mode; that stays with the storage
/// supervisor.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.field_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => StorageHealth::Reachable,
            Err(err) => {
                warn!(error = %err, "field store ping failed");
                StorageHealth::Unreachable
            }
        },
        None => StorageHealth::Missing,
    };

    let status = if state.is_degraded() {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Ok
    };

    HealthResponse {
        status,
        storage,
        open_sessions: state.sessions().len(),
    }
}
