//! Process-local document store.
//!
//! Documents are kept as raw JSON so that partial or legacy documents can be seeded and go
//! through the same hydration path as the persistent backends. Every operation runs under a
//! single mutex, which makes batches and transactions trivially atomic.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{
    CommitOutcome, DocKey, FieldStore, MAX_BATCH_WRITES, MAX_IN_QUERY_IDS, ReadStamp, Versioned,
    WriteOp,
};
use crate::dao::{
    models::{FieldEntity, FieldId, FieldRecord, PlayerEntity, PlayerId, PlayerRecord},
    storage::{StorageError, StorageResult},
};

/// Failures of the in-memory backend; only (de)serialization can go wrong.
#[derive(Debug, Error)]
pub enum MemoryDaoError {
    /// Entity could not be turned into a JSON document.
    #[error("failed to encode document `{key}`")]
    Encode {
        /// Document being written.
        key: DocKey,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// Stored document is not a JSON object.
    #[error("failed to decode document `{key}`")]
    Decode {
        /// Document being read.
        key: DocKey,
        /// Deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<MemoryDaoError> for StorageError {
    fn from(err: MemoryDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

type MemoryResult<T> = Result<T, MemoryDaoError>;

/// In-memory [`FieldStore`] used by tests and storage-less local runs.
#[derive(Clone, Default)]
pub struct MemoryFieldStore {
    inner: Arc<Mutex<HashMap<DocKey, StoredDocument>>>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    version: u64,
    body: Value,
}

/// Write with its document already encoded, so applying a batch cannot fail halfway.
enum PreparedWrite {
    Create(DocKey, Value),
    Put(DocKey, Value),
    Photo(DocKey, String),
}

impl MemoryFieldStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `body` verbatim as the document of field `id`, bypassing hydration.
    pub async fn seed_raw_field(&self, id: FieldId, body: Value) {
        self.seed_raw(DocKey::Field(id), body).await;
    }

    /// Store `body` verbatim as the document of player `id`, bypassing hydration.
    pub async fn seed_raw_player(&self, id: PlayerId, body: Value) {
        self.seed_raw(DocKey::Player(id), body).await;
    }

    /// Insert or replace a field.
    pub async fn seed_field(&self, field: &FieldEntity) -> StorageResult<()> {
        self.commit(vec![WriteOp::PutField(field.clone())]).await?;
        Ok(())
    }

    /// Insert or replace a player.
    pub async fn seed_player(&self, player: &PlayerEntity) -> StorageResult<()> {
        self.commit(vec![WriteOp::PutPlayer(player.clone())]).await?;
        Ok(())
    }

    /// Number of stored field documents.
    pub async fn field_count(&self) -> usize {
        let guard = self.inner.lock().await;
        guard
            .keys()
            .filter(|key| matches!(key, DocKey::Field(_)))
            .count()
    }

    async fn seed_raw(&self, key: DocKey, body: Value) {
        let mut guard = self.inner.lock().await;
        let version = guard.get(&key).map_or(1, |doc| doc.version + 1);
        guard.insert(key, StoredDocument { version, body });
    }

    async fn find_field(&self, id: FieldId) -> MemoryResult<Option<Versioned<FieldEntity>>> {
        let guard = self.inner.lock().await;
        guard
            .get(&DocKey::Field(id))
            .map(|doc| decode_field(id, doc))
            .transpose()
    }

    async fn find_player(&self, id: PlayerId) -> MemoryResult<Option<Versioned<PlayerEntity>>> {
        let guard = self.inner.lock().await;
        let key = DocKey::Player(id.clone());
        guard
            .get(&key)
            .map(|doc| decode_player(id, doc))
            .transpose()
    }

    async fn find_fields_by_ids(
        &self,
        ids: Vec<FieldId>,
    ) -> MemoryResult<Vec<Versioned<FieldEntity>>> {
        let guard = self.inner.lock().await;
        ids.into_iter()
            .filter_map(|id| guard.get(&DocKey::Field(id)).map(|doc| decode_field(id, doc)))
            .collect()
    }

    async fn find_players_by_ids(&self, ids: Vec<PlayerId>) -> MemoryResult<Vec<PlayerEntity>> {
        let guard = self.inner.lock().await;
        let mut players = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = guard.get(&DocKey::Player(id.clone())) {
                players.push(decode_player(id, doc)?.value);
            }
        }
        Ok(players)
    }

    async fn recent_chat_fields(&self, limit: usize) -> MemoryResult<Vec<Versioned<FieldEntity>>> {
        let guard = self.inner.lock().await;
        let mut fields = Vec::new();
        for (key, doc) in guard.iter() {
            if let DocKey::Field(id) = key {
                let field = decode_field(*id, doc)?;
                if field.value.last_message.is_some() {
                    fields.push(field);
                }
            }
        }
        fields.sort_by_key(|field| {
            std::cmp::Reverse(
                field
                    .value
                    .last_message
                    .as_ref()
                    .map(|message| message.sent_at),
            )
        });
        fields.truncate(limit);
        Ok(fields)
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> MemoryResult<()> {
        let prepared = prepare_all(writes)?;
        let mut guard = self.inner.lock().await;
        apply_all(&mut guard, prepared);
        Ok(())
    }

    async fn commit_transaction(
        &self,
        reads: Vec<ReadStamp>,
        writes: Vec<WriteOp>,
    ) -> MemoryResult<CommitOutcome> {
        let prepared = prepare_all(writes)?;
        let mut guard = self.inner.lock().await;
        for stamp in reads {
            let current = guard.get(&stamp.key).map(|doc| doc.version);
            if current != stamp.version {
                return Ok(CommitOutcome::Conflict(Some(stamp.key)));
            }
        }
        apply_all(&mut guard, prepared);
        Ok(CommitOutcome::Committed)
    }
}

fn decode_field(id: FieldId, doc: &StoredDocument) -> MemoryResult<Versioned<FieldEntity>> {
    let record: FieldRecord = decode(DocKey::Field(id), &doc.body)?;
    Ok(Versioned {
        value: record.hydrate(id),
        version: doc.version,
    })
}

fn decode_player(id: PlayerId, doc: &StoredDocument) -> MemoryResult<Versioned<PlayerEntity>> {
    let record: PlayerRecord = decode(DocKey::Player(id.clone()), &doc.body)?;
    Ok(Versioned {
        value: record.hydrate(id, SystemTime::now()),
        version: doc.version,
    })
}

fn decode<T: DeserializeOwned>(key: DocKey, body: &Value) -> MemoryResult<T> {
    T::deserialize(body).map_err(|source| MemoryDaoError::Decode { key, source })
}

fn encode<T: Serialize>(key: &DocKey, record: &T) -> MemoryResult<Value> {
    serde_json::to_value(record).map_err(|source| MemoryDaoError::Encode {
        key: key.clone(),
        source,
    })
}

fn prepare_all(writes: Vec<WriteOp>) -> MemoryResult<Vec<PreparedWrite>> {
    writes
        .into_iter()
        .map(|write| {
            let key = write.key();
            Ok(match write {
                WriteOp::CreateField(field) => {
                    let body = encode(&key, &FieldRecord::from(&field))?;
                    PreparedWrite::Create(key, body)
                }
                WriteOp::PutField(field) => {
                    let body = encode(&key, &FieldRecord::from(&field))?;
                    PreparedWrite::Put(key, body)
                }
                WriteOp::UpdateFieldPhoto { photo, .. } => PreparedWrite::Photo(key, photo),
                WriteOp::CreatePlayer(player) => {
                    let body = encode(&key, &PlayerRecord::from(&player))?;
                    PreparedWrite::Create(key, body)
                }
                WriteOp::PutPlayer(player) => {
                    let body = encode(&key, &PlayerRecord::from(&player))?;
                    PreparedWrite::Put(key, body)
                }
            })
        })
        .collect()
}

fn apply_all(documents: &mut HashMap<DocKey, StoredDocument>, writes: Vec<PreparedWrite>) {
    for write in writes {
        match write {
            PreparedWrite::Create(key, body) => {
                documents
                    .entry(key)
                    .or_insert(StoredDocument { version: 1, body });
            }
            PreparedWrite::Put(key, body) => {
                let version = documents.get(&key).map_or(1, |doc| doc.version + 1);
                documents.insert(key, StoredDocument { version, body });
            }
            PreparedWrite::Photo(key, photo) => {
                if let Some(doc) = documents.get_mut(&key) {
                    match &mut doc.body {
                        Value::Object(map) => {
                            map.insert("photo".to_string(), Value::String(photo));
                        }
                        other => {
                            *other = serde_json::json!({ "photo": photo });
                        }
                    }
                    doc.version += 1;
                }
            }
        }
    }
}

impl FieldStore for MemoryFieldStore {
    fn find_field(
        &self,
        id: FieldId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<FieldEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.find_field(id).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PlayerEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(id).await.map_err(Into::into) })
    }

    fn find_fields_by_ids(
        &self,
        ids: Vec<FieldId>,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            StorageError::check_limit("containment query ids", MAX_IN_QUERY_IDS, ids.len())?;
            store.find_fields_by_ids(ids).await.map_err(Into::into)
        })
    }

    fn find_players_by_ids(
        &self,
        ids: Vec<PlayerId>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            StorageError::check_limit("containment query ids", MAX_IN_QUERY_IDS, ids.len())?;
            store.find_players_by_ids(ids).await.map_err(Into::into)
        })
    }

    fn recent_chat_fields(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<Versioned<FieldEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.recent_chat_fields(limit).await.map_err(Into::into) })
    }

    fn commit_batch(&self, writes: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            StorageError::check_limit("batch writes", MAX_BATCH_WRITES, writes.len())?;
            store.commit(writes).await.map_err(Into::into)
        })
    }

    fn commit_transaction(
        &self,
        reads: Vec<ReadStamp>,
        writes: Vec<WriteOp>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            StorageError::check_limit("transaction writes", MAX_BATCH_WRITES, writes.len())?;
            store
                .commit_transaction(reads, writes)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::models::ChatPointerEntity;

    fn field(id: i64) -> FieldEntity {
        FieldRecord::default().hydrate(FieldId(id))
    }

    #[tokio::test]
    async fn create_never_clobbers_existing_document() {
        let store = MemoryFieldStore::new();
        let mut original = field(1);
        original.name = "Real Name".into();
        store.seed_field(&original).await.unwrap();

        let mut replacement = field(1);
        replacement.name = "Other".into();
        FieldStore::commit_batch(&store, vec![WriteOp::CreateField(replacement)])
            .await
            .unwrap();

        let stored = FieldStore::find_field(&store, FieldId(1)).await.unwrap().unwrap();
        assert_eq!(stored.value.name, "Real Name");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn photo_update_keeps_other_attributes() {
        let store = MemoryFieldStore::new();
        store
            .seed_raw_field(FieldId(5), json!({"name": "Legacy", "rating": 3.5}))
            .await;

        FieldStore::commit_batch(
            &store,
            vec![WriteOp::UpdateFieldPhoto {
                id: FieldId(5),
                photo: "https://img/1.jpg".into(),
            }],
        )
        .await
        .unwrap();

        let stored = FieldStore::find_field(&store, FieldId(5)).await.unwrap().unwrap();
        assert_eq!(stored.value.name, "Legacy");
        assert_eq!(stored.value.rating, 3.5);
        assert_eq!(stored.value.photo, "https://img/1.jpg");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn photo_update_skips_missing_field() {
        let store = MemoryFieldStore::new();
        FieldStore::commit_batch(
            &store,
            vec![WriteOp::UpdateFieldPhoto {
                id: FieldId(5),
                photo: "x".into(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(store.field_count().await, 0);
    }

    #[tokio::test]
    async fn containment_queries_are_capped() {
        let store = MemoryFieldStore::new();
        let ids = (0..31).map(FieldId).collect();
        let err = FieldStore::find_fields_by_ids(&store, ids).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::LimitExceeded {
                limit: 30,
                requested: 31,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn batches_over_the_cap_are_rejected() {
        let store = MemoryFieldStore::new();
        let writes = (0..501).map(|id| WriteOp::CreateField(field(id))).collect();
        let err = FieldStore::commit_batch(&store, writes).await.unwrap_err();
        assert!(matches!(err, StorageError::LimitExceeded { .. }));
        assert_eq!(store.field_count().await, 0);
    }

    #[tokio::test]
    async fn stale_read_stamp_conflicts_without_applying() {
        let store = MemoryFieldStore::new();
        store.seed_field(&field(1)).await.unwrap();
        let stamp = ReadStamp {
            key: DocKey::Field(FieldId(1)),
            version: Some(1),
        };
        store.seed_field(&field(1)).await.unwrap();

        let mut changed = field(1);
        changed.name = "changed".into();
        let outcome =
            FieldStore::commit_transaction(&store, vec![stamp], vec![WriteOp::PutField(changed)])
                .await
                .unwrap();

        assert_eq!(outcome, CommitOutcome::Conflict(Some(DocKey::Field(FieldId(1)))));
        let stored = FieldStore::find_field(&store, FieldId(1)).await.unwrap().unwrap();
        assert_ne!(stored.value.name, "changed");
    }

    #[tokio::test]
    async fn absent_read_stamp_detects_concurrent_create() {
        let store = MemoryFieldStore::new();
        let stamp = ReadStamp {
            key: DocKey::Player(PlayerId::from("x")),
            version: None,
        };
        store
            .seed_raw_player(PlayerId::from("x"), json!({"name": "X"}))
            .await;

        let outcome = FieldStore::commit_transaction(&store, vec![stamp], vec![])
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict(_)));
    }

    #[tokio::test]
    async fn recent_chats_are_sorted_newest_first() {
        let store = MemoryFieldStore::new();
        for (id, sent) in [(1, 100), (2, 300), (3, 200)] {
            let mut f = field(id);
            f.last_message = Some(ChatPointerEntity {
                message_id: format!("m{id}"),
                author_id: PlayerId::from("a"),
                author_name: "A".into(),
                text: "hi".into(),
                sent_at: crate::dao::models::from_millis(sent),
            });
            store.seed_field(&f).await.unwrap();
        }
        store.seed_field(&field(4)).await.unwrap();

        let recent = FieldStore::recent_chat_fields(&store, 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|f| f.value.id).collect();
        assert_eq!(ids, vec![FieldId(2), FieldId(3)]);
    }
}
