use std::{collections::HashMap, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Client, Collection, Database,
    bson::{Document, doc},
    error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoFieldDocument, MongoPlayerDocument, doc_id, stored_version, version_to_i64,
    },
};
use crate::dao::{
    field_store::{
        CommitOutcome, DocKey, FieldStore, MAX_BATCH_WRITES, MAX_IN_QUERY_IDS, ReadStamp,
        Versioned, WriteOp,
    },
    models::{FieldEntity, FieldId, PlayerEntity, PlayerId},
    storage::{StorageError, StorageResult},
};

const FIELD_COLLECTION_NAME: &str = "fields";
const PLAYER_COLLECTION_NAME: &str = "players";

/// MongoDB-backed [`FieldStore`]. Every write runs inside a multi-document transaction.
#[derive(Clone)]
pub struct MongoFieldStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoFieldStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let (_, database) = self.handles().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! { "last_message.sent_at": -1 })
            .options(
                IndexOptions::builder()
                    .name(Some("field_last_message_idx".to_owned()))
                    .sparse(Some(true))
                    .build(),
            )
            .build();

        database
            .collection::<Document>(FIELD_COLLECTION_NAME)
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: FIELD_COLLECTION_NAME,
                index: "last_message.sent_at",
                source,
            })?;

        Ok(())
    }

    async fn handles(&self) -> (Client, Database) {
        let guard = self.inner.state.read().await;
        (guard.client.clone(), guard.database.clone())
    }

    async fn find_field(&self, id: FieldId) -> MongoResult<Option<Versioned<FieldEntity>>> {
        let (_, database) = self.handles().await;
        let document = field_collection(&database)
            .find_one(doc! { "_id": id.0 })
            .await
            .map_err(|source| MongoDaoError::LoadField { id, source })?;
        Ok(document.map(MongoFieldDocument::into_versioned))
    }

    async fn find_player(&self, id: PlayerId) -> MongoResult<Option<Versioned<PlayerEntity>>> {
        let (_, database) = self.handles().await;
        let document = player_collection(&database)
            .find_one(doc! { "_id": id.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadPlayer {
                id: id.clone(),
                source,
            })?;
        Ok(document.map(MongoPlayerDocument::into_versioned))
    }

    async fn find_fields_by_ids(
        &self,
        ids: Vec<FieldId>,
    ) -> MongoResult<Vec<Versioned<FieldEntity>>> {
        let (_, database) = self.handles().await;
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let query_error = |source| MongoDaoError::Query {
            collection: FIELD_COLLECTION_NAME,
            source,
        };

        let documents: Vec<MongoFieldDocument> = field_collection(&database)
            .find(doc! { "_id": { "$in": raw_ids } })
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents
            .into_iter()
            .map(MongoFieldDocument::into_versioned)
            .collect())
    }

    async fn find_players_by_ids(&self, ids: Vec<PlayerId>) -> MongoResult<Vec<PlayerEntity>> {
        let (_, database) = self.handles().await;
        let raw_ids: Vec<String> = ids.into_iter().map(|id| id.0).collect();
        let query_error = |source| MongoDaoError::Query {
            collection: PLAYER_COLLECTION_NAME,
            source,
        };

        let documents: Vec<MongoPlayerDocument> = player_collection(&database)
            .find(doc! { "_id": { "$in": raw_ids } })
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents
            .into_iter()
            .map(|document| document.into_versioned().value)
            .collect())
    }

    async fn recent_chat_fields(
        &self,
        limit: usize,
    ) -> MongoResult<Vec<Versioned<FieldEntity>>> {
        let (_, database) = self.handles().await;
        let query_error = |source| MongoDaoError::Query {
            collection: FIELD_COLLECTION_NAME,
            source,
        };

        let documents: Vec<MongoFieldDocument> = field_collection(&database)
            .find(doc! { "last_message": { "$ne": null } })
            .sort(doc! { "last_message.sent_at": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents
            .into_iter()
            .map(MongoFieldDocument::into_versioned)
            .collect())
    }

    async fn commit_batch(&self, writes: Vec<WriteOp>) -> MongoResult<()> {
        match self.commit_transaction(Vec::new(), writes).await? {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::Conflict(_) => Err(MongoDaoError::BatchConflict),
        }
    }

    /// Verify `reads` and apply `writes` inside one MongoDB transaction.
    ///
    /// Version mismatches and transient transaction errors (write conflicts, unknown commit
    /// results) are reported as [`CommitOutcome::Conflict`] so the caller can re-run its body.
    async fn commit_transaction(
        &self,
        reads: Vec<ReadStamp>,
        writes: Vec<WriteOp>,
    ) -> MongoResult<CommitOutcome> {
        let (client, database) = self.handles().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;

        let staged = stage(&database, &mut session, &reads, writes).await;
        let conflict = match staged {
            Ok(None) => None,
            Ok(Some(key)) => Some(Some(key)),
            Err(err) if is_conflict(&err) => Some(None),
            Err(source) => {
                abort(&mut session).await;
                return Err(MongoDaoError::Transaction { source });
            }
        };
        if let Some(key) = conflict {
            abort(&mut session).await;
            return Ok(CommitOutcome::Conflict(key));
        }

        match session.commit_transaction().await {
            Ok(()) => Ok(CommitOutcome::Committed),
            Err(err) if is_conflict(&err) => Ok(CommitOutcome::Conflict(None)),
            Err(source) => Err(MongoDaoError::Transaction { source }),
        }
    }
}

fn field_collection(database: &Database) -> Collection<MongoFieldDocument> {
    database.collection::<MongoFieldDocument>(FIELD_COLLECTION_NAME)
}

fn player_collection(database: &Database) -> Collection<MongoPlayerDocument> {
    database.collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
}

fn raw_collection(database: &Database, key: &DocKey) -> Collection<Document> {
    match key {
        DocKey::Field(_) => database.collection::<Document>(FIELD_COLLECTION_NAME),
        DocKey::Player(_) => database.collection::<Document>(PLAYER_COLLECTION_NAME),
    }
}

fn is_conflict(err: &MongoError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
        || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
}

async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        debug!(error = %err, "failed to abort MongoDB transaction");
    }
}

async fn current_version(
    database: &Database,
    session: &mut ClientSession,
    key: &DocKey,
) -> Result<Option<i64>, MongoError> {
    let document = raw_collection(database, key)
        .find_one(doc_id(key))
        .projection(doc! { "version": 1 })
        .session(&mut *session)
        .await?;
    Ok(document.as_ref().map(stored_version))
}

/// Check every read stamp, then apply the writes. Returns the first stale key, if any.
async fn stage(
    database: &Database,
    session: &mut ClientSession,
    reads: &[ReadStamp],
    writes: Vec<WriteOp>,
) -> Result<Option<DocKey>, MongoError> {
    let mut versions: HashMap<DocKey, Option<i64>> = HashMap::new();
    for stamp in reads {
        let current = current_version(database, session, &stamp.key).await?;
        if current != stamp.version.map(version_to_i64) {
            return Ok(Some(stamp.key.clone()));
        }
        versions.insert(stamp.key.clone(), current);
    }

    for write in writes {
        let key = write.key();
        let current = match versions.get(&key) {
            Some(version) => *version,
            None => current_version(database, session, &key).await?,
        };
        let next = current.unwrap_or(0) + 1;

        let written = match write {
            WriteOp::CreateField(field) => {
                if current.is_none() {
                    field_collection(database)
                        .insert_one(MongoFieldDocument::new(&field, next))
                        .session(&mut *session)
                        .await?;
                }
                current.is_none()
            }
            WriteOp::PutField(field) => {
                field_collection(database)
                    .replace_one(doc_id(&key), MongoFieldDocument::new(&field, next))
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
                true
            }
            WriteOp::UpdateFieldPhoto { photo, .. } => {
                if current.is_some() {
                    raw_collection(database, &key)
                        .update_one(
                            doc_id(&key),
                            doc! { "$set": { "photo": photo, "version": next } },
                        )
                        .session(&mut *session)
                        .await?;
                }
                current.is_some()
            }
            WriteOp::CreatePlayer(player) => {
                if current.is_none() {
                    player_collection(database)
                        .insert_one(MongoPlayerDocument::new(&player, next))
                        .session(&mut *session)
                        .await?;
                }
                current.is_none()
            }
            WriteOp::PutPlayer(player) => {
                player_collection(database)
                    .replace_one(doc_id(&key), MongoPlayerDocument::new(&player, next))
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
                true
            }
        };

        if written {
            versions.insert(key, Some(next));
        } else {
            versions.insert(key, current);
        }
    }

    Ok(None)
}

impl FieldStore for MongoFieldStore {
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
            store.commit_batch(writes).await.map_err(Into::into)
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
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
