use serde::Serialize;
use utoipa::ToSchema;

/// Overall verdict of `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Searches, check-ins and community writes are accepted.
    Ok,
    /// Storage is missing or unhealthy; every storage-backed request is refused.
    Degraded,
}

/// What the storage ping observed during this health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageHealth {
    /// The backend answered the ping.
    Reachable,
    /// A backend is installed but the ping failed.
    Unreachable,
    /// No backend is installed.
    Missing,
}

/// Body of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall verdict.
    pub status: ServiceStatus,
    /// Result of pinging the field store.
    pub storage: StorageHealth,
    /// Client sessions currently driving auto-checkout.
    pub open_sessions: usize,
}
