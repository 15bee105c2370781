use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "pitchside";

/// Connection settings for the MongoDB backend.
///
/// Multi-document transactions are used for every write, so the target deployment must be a
/// replica set (a single-node replica set is enough for development).
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Pings attempted before giving up on a (re)connection.
    pub connect_attempts: u32,
    /// Delay after the first failed ping; doubled up to [`MongoConfig::max_backoff`].
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DATABASE).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            connect_attempts: 10,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional, defaults to `pitchside`).
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self::from_uri(&uri, db.as_deref()).await
    }
}
