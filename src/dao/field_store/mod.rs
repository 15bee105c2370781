pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::fmt;

use futures::future::BoxFuture;

use crate::dao::{
    models::{FieldEntity, FieldId, PlayerEntity, PlayerId},
    storage::StorageResult,
};

/// Maximum number of ids accepted by a single containment query.
pub const MAX_IN_QUERY_IDS: usize = 30;
/// Maximum number of write operations accepted by a single batch.
pub const MAX_BATCH_WRITES: usize = 500;

/// Address of a document in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocKey {
    /// Document in the `fields` collection.
    Field(FieldId),
    /// Document in the `players` collection.
    Player(PlayerId),
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Field(id) => write!(f, "fields/{id}"),
            DocKey::Player(id) => write!(f, "players/{id}"),
        }
    }
}

/// Document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Hydrated document.
    pub value: T,
    /// Monotonic document version; bumped on every write.
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Whether `self` is at least as recent as `other`.
    pub fn supersedes(&self, other: &Versioned<T>) -> bool {
        self.version >= other.version
    }
}

/// Version observed by a transactional read. `None` records that the document was absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStamp {
    /// Document that was read.
    pub key: DocKey,
    /// Version seen, if the document existed.
    pub version: Option<u64>,
}

/// Single write applied by [`FieldStore::commit_batch`] or [`FieldStore::commit_transaction`].
///
/// Every applied write sets the document version to one more than before, an absent document
/// counting as version 0. Skipped writes leave the version alone.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert the field unless a document already exists; an existing one is left untouched.
    CreateField(FieldEntity),
    /// Replace the whole field document.
    PutField(FieldEntity),
    /// Change only the photo of an existing field; a missing field is skipped.
    UpdateFieldPhoto {
        /// Target field.
        id: FieldId,
        /// New photo URL.
        photo: String,
    },
    /// Insert the player unless a document already exists.
    CreatePlayer(PlayerEntity),
    /// Replace the whole player document.
    PutPlayer(PlayerEntity),
}

impl WriteOp {
    /// Document touched by the write.
    pub fn key(&self) -> DocKey {
        match self {
            WriteOp::CreateField(field) | WriteOp::PutField(field) => DocKey::Field(field.id),
            WriteOp::UpdateFieldPhoto { id, .. } => DocKey::Field(*id),
            WriteOp::CreatePlayer(player) | WriteOp::PutPlayer(player) => {
                DocKey::Player(player.id.clone())
            }
        }
    }
}

/// Result of [`FieldStore::commit_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every read was still current; all writes were applied.
    Committed,
    /// A read document changed (or a concurrent writer won); nothing was applied.
    Conflict(Option<DocKey>),
}

/// Abstraction over the document store holding fields and players.
///
/// Reads always return hydrated entities. Writes go through either
/// [`commit_batch`](FieldStore::commit_batch), which is atomic per call and capped at
/// [`MAX_BATCH_WRITES`], or [`commit_transaction`](FieldStore::commit_transaction), which only
/// applies its writes when every recorded read is still at the version observed.
pub trait FieldStore: Send + Sync {
    /// Field by id with its version.
    fn find_field(
        &self,
        id: FieldId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<FieldEntity>>>>;
    /// Player by id with its version.
    fn find_player(
        &self,
        id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>>;
    /// Containment query; rejects more than [`MAX_IN_QUERY_IDS`] ids with `LimitExceeded`.
    fn find_fields_by_ids(
        &self,
        ids: Vec<FieldId>,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>>;
    /// Containment query; rejects more than [`MAX_IN_QUERY_IDS`] ids with `LimitExceeded`.
    fn find_players_by_ids(
        &self,
        ids: Vec<PlayerId>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Fields carrying a chat pointer, most recent message first.
    fn recent_chat_fields(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>>;
    /// Apply `writes` atomically; rejects more than [`MAX_BATCH_WRITES`] operations.
    fn commit_batch(&self, writes: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>>;
    /// Apply `writes` only if every read in `reads` is still current.
    fn commit_transaction(
        &self,
        reads: Vec<ReadStamp>,
        writes: Vec<WriteOp>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    /// Cheap round-trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
