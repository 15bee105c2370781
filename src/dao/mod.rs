/// Field and player persistence.
pub mod field_store;
/// External geodata and image providers.
pub mod geodata;
/// Persisted records and hydrated entities.
pub mod models;
/// Backend-agnostic storage errors.
pub mod storage;
