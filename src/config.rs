//! Application-level configuration loading: provider endpoints, batching limits, presence
//! timings and the placeholder rules used by catalog reconciliation.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    dao::{
        field_store::{MAX_BATCH_WRITES, MAX_IN_QUERY_IDS},
        geodata::overpass::DEFAULT_OVERPASS_ENDPOINTS,
        models::DEFAULT_FIELD_NAME,
    },
    services::reconciliation::PlaceholderRules,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PITCHSIDE_CONFIG_PATH";
/// Environment variable holding the image pool API key.
const IMAGE_POOL_KEY_ENV: &str = "PITCHSIDE_IMAGE_POOL_KEY";

/// Geodata provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodataConfig {
    /// Overpass endpoints, tried in order.
    pub endpoints: Vec<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Radius used when a search does not name one.
    pub default_radius_m: f64,
}

/// Decorative image pool settings. Without an API key the pool is disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePoolConfig {
    /// Search endpoint.
    pub endpoint: String,
    /// API key; `None` disables the pool.
    pub api_key: Option<String>,
    /// Search terms.
    pub query: String,
    /// Number of images requested.
    pub per_page: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Presence timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Minimum session length that credits a visit on check-out.
    pub visit_dwell: Duration,
    /// Presence age after which a session monitor forces a check-out.
    pub auto_checkout_after: Duration,
    /// Cadence of session monitor sweeps.
    pub sweep_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            visit_dwell: Duration::from_secs(15 * 60),
            auto_checkout_after: Duration::from_secs(12 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Geodata provider.
    pub geodata: GeodataConfig,
    /// Image pool used for photo backfill.
    pub images: ImagePoolConfig,
    /// Presence timings.
    pub presence: PresenceConfig,
    /// Which names and photos count as placeholders during reconciliation.
    pub placeholders: PlaceholderRules,
    /// Ids per containment query; never above the backend cap.
    pub lookup_chunk_size: usize,
    /// Writes per reconciliation batch; never above the backend cap.
    pub batch_limit: usize,
    /// Number of fields listed by the recent chats view.
    pub recent_chats_limit: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        endpoints = app_config.geodata.endpoints.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env::var(IMAGE_POOL_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
        {
            self.images.api_key = Some(key);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
/// Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    geodata: RawGeodata,
    images: RawImages,
    presence: RawPresence,
    placeholders: RawPlaceholders,
    lookup_chunk_size: Option<usize>,
    batch_limit: Option<usize>,
    recent_chats_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGeodata {
    endpoints: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
    default_radius_m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawImages {
    endpoint: Option<String>,
    api_key: Option<String>,
    query: Option<String>,
    per_page: Option<u32>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPresence {
    visit_dwell_secs: Option<u64>,
    auto_checkout_after_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlaceholders {
    names: Option<Vec<String>>,
    name_prefixes: Option<Vec<String>>,
    photo_markers: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let presence_defaults = PresenceConfig::default();
        let secs = Duration::from_secs;

        Self {
            geodata: GeodataConfig {
                endpoints: value
                    .geodata
                    .endpoints
                    .filter(|endpoints| !endpoints.is_empty())
                    .unwrap_or_else(|| {
                        DEFAULT_OVERPASS_ENDPOINTS
                            .iter()
                            .map(|endpoint| endpoint.to_string())
                            .collect()
                    }),
                request_timeout: secs(value.geodata.request_timeout_secs.unwrap_or(30)),
                default_radius_m: value.geodata.default_radius_m.unwrap_or(5_000.0),
            },
            images: ImagePoolConfig {
                endpoint: value
                    .images
                    .endpoint
                    .unwrap_or_else(|| "https://pixabay.com/api/".to_string()),
                api_key: value.images.api_key.filter(|key| !key.trim().is_empty()),
                query: value
                    .images
                    .query
                    .unwrap_or_else(|| "football stadium".to_string()),
                per_page: value.images.per_page.unwrap_or(50),
                request_timeout: secs(value.images.request_timeout_secs.unwrap_or(10)),
            },
            presence: PresenceConfig {
                visit_dwell: value
                    .presence
                    .visit_dwell_secs
                    .map(secs)
                    .unwrap_or(presence_defaults.visit_dwell),
                auto_checkout_after: value
                    .presence
                    .auto_checkout_after_secs
                    .map(secs)
                    .unwrap_or(presence_defaults.auto_checkout_after),
                sweep_interval: value
                    .presence
                    .sweep_interval_secs
                    .filter(|value| *value > 0)
                    .map(secs)
                    .unwrap_or(presence_defaults.sweep_interval),
            },
            placeholders: PlaceholderRules {
                names: value.placeholders.names.unwrap_or_else(|| {
                    vec![
                        DEFAULT_FIELD_NAME.to_string(),
                        "Стадион без названия".to_string(),
                    ]
                }),
                name_prefixes: value
                    .placeholders
                    .name_prefixes
                    .unwrap_or_else(|| vec!["Стадион (".to_string()]),
                photo_markers: value
                    .placeholders
                    .photo_markers
                    .unwrap_or_else(|| vec!["unsplash".to_string()]),
            },
            lookup_chunk_size: value
                .lookup_chunk_size
                .unwrap_or(MAX_IN_QUERY_IDS)
                .clamp(1, MAX_IN_QUERY_IDS),
            batch_limit: value
                .batch_limit
                .unwrap_or(MAX_BATCH_WRITES)
                .clamp(1, MAX_BATCH_WRITES),
            recent_chats_limit: value.recent_chats_limit.unwrap_or(20),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = serde_json::from_str::<RawConfig>("{}").unwrap().into();

        assert_eq!(config.geodata.endpoints.len(), 3);
        assert_eq!(config.lookup_chunk_size, 30);
        assert_eq!(config.batch_limit, 500);
        assert_eq!(config.recent_chats_limit, 20);
        assert_eq!(config.presence, PresenceConfig::default());
        assert!(config.images.api_key.is_none());
        assert!(config.placeholders.is_placeholder_name(DEFAULT_FIELD_NAME));
    }

    #[test]
    fn limits_are_clamped_to_backend_caps() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"lookup_chunk_size": 100, "batch_limit": 0}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.lookup_chunk_size, 30);
        assert_eq!(config.batch_limit, 1);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"presence": {"visit_dwell_secs": 60}, "geodata": {"endpoints": ["http://x"]}}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.presence.visit_dwell, Duration::from_secs(60));
        assert_eq!(
            config.presence.auto_checkout_after,
            Duration::from_secs(12 * 3600)
        );
        assert_eq!(config.geodata.endpoints, vec!["http://x".to_string()]);
    }
}
