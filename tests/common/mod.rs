#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use pitchside_back::{
    config::AppConfig,
    dao::{
        field_store::{
            CommitOutcome, FieldStore, ReadStamp, Versioned, WriteOp, memory::MemoryFieldStore,
        },
        geodata::{
            GeodataProvider, ImagePool, ImageSource, ProviderError,
            elements::{ElementKind, RawElement},
        },
        models::{FieldEntity, FieldId, FieldRecord, PlayerEntity, PlayerId},
        storage::{StorageError, StorageResult},
    },
    state::{AppState, SharedState, clock::ManualClock, geo::Position},
};
use tokio::sync::Notify;

pub fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Geodata provider answering from memory, or failing like an exhausted endpoint list.
pub struct FakeGeodata {
    elements: Mutex<Option<Vec<RawElement>>>,
    pub calls: AtomicUsize,
}

impl FakeGeodata {
    pub fn with(elements: Vec<RawElement>) -> Arc<Self> {
        Arc::new(Self {
            elements: Mutex::new(Some(elements)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            elements: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, elements: Option<Vec<RawElement>>) {
        *self.elements.lock().unwrap() = elements;
    }
}

impl GeodataProvider for FakeGeodata {
    fn fetch_elements(
        &self,
        _center: Position,
        _radius_m: f64,
    ) -> BoxFuture<'static, Result<Vec<RawElement>, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.elements.lock().unwrap().clone();
        Box::pin(async move { answer.ok_or(ProviderError::AllEndpointsFailed { attempts: 3 }) })
    }
}

/// Image source with a fixed pool.
pub struct FakeImages(pub Vec<String>);

impl ImageSource for FakeImages {
    fn fetch_pool(&self) -> BoxFuture<'static, Result<ImagePool, ProviderError>> {
        let pool = ImagePool::new(self.0.clone());
        Box::pin(async move { Ok(pool) })
    }
}

pub fn node(id: i64, lat: f64, lng: f64, tags: &[(&str, &str)]) -> RawElement {
    RawElement {
        kind: ElementKind::Node,
        id,
        lat: Some(lat),
        lon: Some(lng),
        center: None,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn field(id: i64) -> FieldEntity {
    let mut field = FieldRecord::default().hydrate(FieldId(id));
    field.name = format!("Field {id}");
    field.position = Position::new(55.75, 37.61);
    field
}

pub fn player(id: &str) -> PlayerEntity {
    let mut player = PlayerEntity::new(PlayerId::from(id), t0());
    player.name = format!("Player {id}");
    player
}

pub struct Harness {
    pub state: SharedState,
    pub memory: MemoryFieldStore,
    pub clock: Arc<ManualClock>,
    pub geodata: Arc<FakeGeodata>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(AppConfig::default(), FakeGeodata::with(Vec::new()), Vec::new(), None).await
    }

    pub async fn with_geodata(geodata: Arc<FakeGeodata>, pool: Vec<String>) -> Self {
        Self::build(AppConfig::default(), geodata, pool, None).await
    }

    /// Build a harness, optionally routing storage through a [`FlakyStore`].
    pub async fn build(
        config: AppConfig,
        geodata: Arc<FakeGeodata>,
        pool: Vec<String>,
        flaky: Option<FlakyStore>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let state = AppState::new(
            config,
            geodata.clone(),
            Arc::new(FakeImages(pool)),
            clock.clone(),
        );
        let (memory, store): (MemoryFieldStore, Arc<dyn FieldStore>) = match flaky {
            Some(flaky) => (flaky.inner.clone(), Arc::new(flaky)),
            None => {
                let memory = MemoryFieldStore::new();
                (memory.clone(), Arc::new(memory))
            }
        };
        state.set_field_store(store).await;
        Self {
            state,
            memory,
            clock,
            geodata,
        }
    }

    pub async fn stored_field(&self, id: i64) -> Option<FieldEntity> {
        self.state
            .field_store()
            .await
            .unwrap()
            .find_field(FieldId(id))
            .await
            .unwrap()
            .map(|doc| doc.value)
    }

    pub async fn stored_player(&self, id: &str) -> Option<PlayerEntity> {
        self.state
            .field_store()
            .await
            .unwrap()
            .find_player(PlayerId::from(id))
            .await
            .unwrap()
            .map(|doc| doc.value)
    }
}

/// Holds a containment lookup after it has read until the test releases it.
#[derive(Default)]
pub struct LookupGate {
    pub reached: Notify,
    pub release: Notify,
}

/// Store wrapper that can fail batches and inject concurrent writes.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryFieldStore,
    /// Batches allowed to commit before every later one fails.
    pub healthy_batches: Arc<AtomicUsize>,
    pub batches_seen: Arc<AtomicUsize>,
    /// Transactions that lose with a conflict before one is allowed through.
    pub conflicts_left: Arc<AtomicUsize>,
    /// Gate applied to the next field lookups, if armed.
    pub lookup_gate: Arc<Mutex<Option<Arc<LookupGate>>>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryFieldStore) -> Self {
        Self {
            inner,
            healthy_batches: Arc::new(AtomicUsize::new(usize::MAX)),
            batches_seen: Arc::new(AtomicUsize::new(0)),
            conflicts_left: Arc::new(AtomicUsize::new(0)),
            lookup_gate: Arc::new(Mutex::new(None)),
        }
    }

    /// Hold the next field lookups between their read and their return.
    pub fn arm_lookup_gate(&self) -> Arc<LookupGate> {
        let gate = Arc::new(LookupGate::default());
        *self.lookup_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[derive(Debug, thiserror::Error)]
#[error("injected failure")]
pub struct Injected;

impl FieldStore for FlakyStore {
    fn find_field(
        &self,
        id: FieldId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<FieldEntity>>>> {
        FieldStore::find_field(&self.inner, id)
    }

    fn find_player(
        &self,
        id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>> {
        FieldStore::find_player(&self.inner, id)
    }

    fn find_fields_by_ids(
        &self,
        ids: Vec<FieldId>,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>> {
        let read = FieldStore::find_fields_by_ids(&self.inner, ids);
        let gate = self.lookup_gate.lock().unwrap().take();
        Box::pin(async move {
            let found = read.await?;
            if let Some(gate) = gate {
                gate.reached.notify_one();
                gate.release.notified().await;
            }
            Ok(found)
        })
    }

    fn find_players_by_ids(
        &self,
        ids: Vec<PlayerId>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        FieldStore::find_players_by_ids(&self.inner, ids)
    }

    fn recent_chat_fields(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>> {
        FieldStore::recent_chat_fields(&self.inner, limit)
    }

    fn commit_batch(&self, writes: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>> {
        let seen = self.batches_seen.fetch_add(1, Ordering::SeqCst);
        if seen >= self.healthy_batches.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::unavailable("batch rejected".into(), Injected))
            });
        }
        FieldStore::commit_batch(&self.inner, writes)
    }

    fn commit_transaction(
        &self,
        reads: Vec<ReadStamp>,
        writes: Vec<WriteOp>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let lose = self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lose {
            return Box::pin(async { Ok(CommitOutcome::Conflict(None)) });
        }
        FieldStore::commit_transaction(&self.inner, reads, writes)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        FieldStore::health_check(&self.inner)
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        FieldStore::try_reconnect(&self.inner)
    }
}
