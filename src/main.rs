//! Pitchside Back binary entrypoint wiring REST, SSE, geodata providers and the storage backend.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitchside_back::{
    config::AppConfig,
    dao::{
        field_store::memory::MemoryFieldStore,
        geodata::{
            ImageSource,
            images::{DisabledImageSource, PixabayImageSource},
            overpass::OverpassClient,
        },
    },
    routes,
    state::{AppState, SharedState, clock::SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let geodata = OverpassClient::new(
        config.geodata.endpoints.clone(),
        config.geodata.request_timeout,
    )
    .context("building geodata client")?;
    let images = image_source(&config)?;

    let app_state = AppState::new(config, Arc::new(geodata), images, Arc::new(SystemClock));

    start_storage(app_state.clone()).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("serving axum")?;

    Ok(())
}

fn image_source(config: &AppConfig) -> anyhow::Result<Arc<dyn ImageSource>> {
    let images = &config.images;
    match &images.api_key {
        Some(key) => {
            let source = PixabayImageSource::new(
                images.endpoint.clone(),
                key.clone(),
                images.query.clone(),
                images.per_page,
                images.request_timeout,
            )
            .context("building image pool client")?;
            Ok(Arc::new(source))
        }
        None => {
            info!("image pool key not configured; photo backfill disabled");
            Ok(Arc::new(DisabledImageSource))
        }
    }
}

/// Install the storage backend: MongoDB under the storage supervisor when `MONGO_URI` is set,
/// the in-memory store otherwise.
async fn start_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if env::var("MONGO_URI").is_ok() {
            tokio::spawn(run_mongo_supervisor(state));
            return;
        }
    }

    warn!("no MongoDB configured; running on the in-memory store");
    state
        .set_field_store(Arc::new(MemoryFieldStore::new()))
        .await;
}

/// Supervises the MongoDB connection by retrying in the background and toggling
/// degraded mode when connectivity changes.
#[cfg(feature = "mongo-store")]
async fn run_mongo_supervisor(state: SharedState) {
    use pitchside_back::{
        dao::{
            field_store::{
                FieldStore,
                mongodb::{MongoConfig, MongoFieldStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    storage_supervisor::run(state, || async {
        let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
        let store = MongoFieldStore::connect(config)
            .await
            .map_err(StorageError::from)?;
        Ok(Arc::new(store) as Arc<dyn FieldStore>)
    })
    .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM, then close every client session so their monitors stop.
async fn shutdown_signal(state: SharedState) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(sessions = state.sessions().len(), "shutting down; closing client sessions");
    state.close_all_sessions();
}
