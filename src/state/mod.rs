pub mod catalog;
pub mod clock;
pub mod geo;
pub mod presence;
pub mod sessions;
mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{
        field_store::FieldStore,
        geodata::{GeodataProvider, ImageSource},
    },
    error::ServiceError,
    services::sse_events,
};

pub use self::{
    sessions::{PlayerSession, SessionRegistry},
    sse::SseHub,
};
use self::{catalog::FieldCatalog, clock::Clock};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;

/// Central application state: storage handle, providers, the confirmed catalog view, open
/// sessions and the SSE hub.
pub struct AppState {
    config: AppConfig,
    field_store: RwLock<Option<Arc<dyn FieldStore>>>,
    geodata: Arc<dyn GeodataProvider>,
    images: Arc<dyn ImageSource>,
    clock: Arc<dyn Clock>,
    catalog: RwLock<FieldCatalog>,
    sessions: SessionRegistry,
    sse: SseHub,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        geodata: Arc<dyn GeodataProvider>,
        images: Arc<dyn ImageSource>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            field_store: RwLock::new(None),
            geodata,
            images,
            clock,
            catalog: RwLock::new(FieldCatalog::new()),
            sessions: SessionRegistry::new(),
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current field store, if one is installed.
    pub async fn field_store(&self) -> Option<Arc<dyn FieldStore>> {
        let guard = self.field_store.read().await;
        guard.as_ref().cloned()
    }

    /// Field store, or [`ServiceError::Degraded`] while storage is missing or unhealthy.
    pub async fn require_field_store(&self) -> Result<Arc<dyn FieldStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.field_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new field store implementation and leave degraded mode.
    pub async fn set_field_store(&self, store: Arc<dyn FieldStore>) {
        {
            let mut guard = self.field_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current field store and enter degraded mode.
    pub async fn clear_field_store(&self) {
        {
            let mut guard = self.field_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag; changes are published to watchers and SSE subscribers.
    pub fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            sse_events::broadcast_system_status(self, value);
        }
    }

    /// Geodata provider used by catalog searches.
    pub fn geodata(&self) -> &Arc<dyn GeodataProvider> {
        &self.geodata
    }

    /// Image pool source used for photo backfill.
    pub fn images(&self) -> &Arc<dyn ImageSource> {
        &self.images
    }

    /// Wall clock used for presence bookkeeping.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Confirmed catalog view.
    pub fn catalog(&self) -> &RwLock<FieldCatalog> {
        &self.catalog
    }

    /// Open client sessions, one per player.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Close every session, cancelling their monitors.
    pub fn close_all_sessions(&self) {
        self.sessions.clear();
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }
}
