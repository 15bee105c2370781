//! Optimistic multi-document transactions over a [`FieldStore`].
//!
//! A transaction body first performs all of its reads through [`Transaction`], then stages
//! its writes. Nothing reaches the store until the body returns; the store then applies the
//! writes only if none of the documents read has changed in the meantime. On conflict the body
//! runs again from scratch against fresh reads.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::{
    dao::{
        field_store::{CommitOutcome, DocKey, FieldStore, ReadStamp, Versioned, WriteOp},
        models::{FieldEntity, FieldId, PlayerEntity, PlayerId},
    },
    error::ServiceError,
};

/// Attempts made before giving up with `TransactionConflictExhausted`.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Read set and staged writes of one transaction attempt.
pub struct Transaction {
    store: Arc<dyn FieldStore>,
    reads: Vec<ReadStamp>,
    writes: Vec<WriteOp>,
}

impl Transaction {
    fn new(store: Arc<dyn FieldStore>) -> Self {
        Self {
            store,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Read a field and record its version.
    pub async fn get_field(&mut self, id: FieldId) -> Result<Option<FieldEntity>, ServiceError> {
        self.ensure_reading(DocKey::Field(id))?;
        let found = self.store.find_field(id).await?;
        self.record(DocKey::Field(id), found.as_ref().map(|doc| doc.version));
        Ok(found.map(|doc| doc.value))
    }

    /// Read a player and record its version.
    pub async fn get_player(
        &mut self,
        id: &PlayerId,
    ) -> Result<Option<PlayerEntity>, ServiceError> {
        let key = DocKey::Player(id.clone());
        self.ensure_reading(key.clone())?;
        let found = self.store.find_player(id.clone()).await?;
        self.record(key, found.as_ref().map(|doc| doc.version));
        Ok(found.map(|doc| doc.value))
    }

    /// Stage a full replacement of `field`.
    pub fn put_field(&mut self, field: FieldEntity) {
        self.writes.push(WriteOp::PutField(field));
    }

    /// Stage a full replacement of `player`.
    pub fn put_player(&mut self, player: PlayerEntity) {
        self.writes.push(WriteOp::PutPlayer(player));
    }

    /// `field` paired with the version the staged writes give it once this attempt commits.
    ///
    /// Call after staging every write of the field; a field that was only read keeps the
    /// version it was read at.
    pub fn committed_field(&self, field: FieldEntity) -> Versioned<FieldEntity> {
        let key = DocKey::Field(field.id);
        let read = self
            .reads
            .iter()
            .find(|stamp| stamp.key == key)
            .and_then(|stamp| stamp.version)
            .unwrap_or(0);
        let written = self.writes.iter().filter(|write| write.key() == key).count() as u64;
        Versioned {
            value: field,
            version: read + written,
        }
    }

    /// Number of writes staged so far.
    pub fn staged_writes(&self) -> usize {
        self.writes.len()
    }

    fn ensure_reading(&self, key: DocKey) -> Result<(), ServiceError> {
        if self.writes.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Internal(format!(
                "transaction read of {key} after a staged write"
            )))
        }
    }

    fn record(&mut self, key: DocKey, version: Option<u64>) {
        // The first observation is the one the body acted on.
        if !self.reads.iter().any(|stamp| stamp.key == key) {
            self.reads.push(ReadStamp { key, version });
        }
    }
}

/// Run `body` as an optimistic transaction, re-running it on conflicts.
///
/// Errors returned by the body abort the transaction without writing anything. Bodies that
/// stage no write never touch the commit path.
///
/// ```ignore
/// let renamed = run_transaction(&store, |tx| {
///     Box::pin(async move {
///         let mut field = tx.get_field(id).await?.ok_or(ServiceError::FieldUnavailable(id))?;
///         field.name = "Renamed".into();
///         tx.put_field(field.clone());
///         Ok(field)
///     })
/// })
/// .await?;
/// ```
pub async fn run_transaction<T, F>(
    store: &Arc<dyn FieldStore>,
    mut body: F,
) -> Result<T, ServiceError>
where
    F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, Result<T, ServiceError>>,
{
    for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
        let mut tx = Transaction::new(store.clone());
        let value = body(&mut tx).await?;
        let Transaction { reads, writes, .. } = tx;

        if writes.is_empty() {
            return Ok(value);
        }

        match store.commit_transaction(reads, writes).await? {
            CommitOutcome::Committed => return Ok(value),
            CommitOutcome::Conflict(key) => {
                debug!(attempt, key = ?key, "transaction conflict; retrying");
            }
        }
    }

    Err(ServiceError::TransactionConflictExhausted {
        attempts: MAX_TRANSACTION_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::dao::{field_store::memory::MemoryFieldStore, models::FieldRecord};

    fn stores() -> (MemoryFieldStore, Arc<dyn FieldStore>) {
        let memory = MemoryFieldStore::new();
        let store: Arc<dyn FieldStore> = Arc::new(memory.clone());
        (memory, store)
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let (memory, store) = stores();
        memory
            .seed_field(&FieldRecord::default().hydrate(FieldId(1)))
            .await
            .unwrap();

        run_transaction(&store, |tx| {
            Box::pin(async move {
                let mut field = tx.get_field(FieldId(1)).await?.unwrap();
                field.name = "Renamed".into();
                tx.put_field(field);
                Ok(())
            })
        })
        .await
        .unwrap();

        let stored = store.find_field(FieldId(1)).await.unwrap().unwrap();
        assert_eq!(stored.value.name, "Renamed");
    }

    #[tokio::test]
    async fn committed_field_predicts_the_stored_version() {
        let (memory, store) = stores();
        let field = FieldRecord::default().hydrate(FieldId(1));
        memory.seed_field(&field).await.unwrap();
        memory.seed_field(&field).await.unwrap();

        let (written, untouched) = run_transaction(&store, |tx| {
            Box::pin(async move {
                let mut field = tx.get_field(FieldId(1)).await?.unwrap();
                let absent = tx.get_field(FieldId(2)).await?;
                assert!(absent.is_none());
                field.name = "Renamed".into();
                tx.put_field(field.clone());
                let created = FieldRecord::default().hydrate(FieldId(2));
                tx.put_field(created.clone());
                Ok((tx.committed_field(field), tx.committed_field(created)))
            })
        })
        .await
        .unwrap();

        let stored = store.find_field(FieldId(1)).await.unwrap().unwrap();
        assert_eq!(written.version, 3);
        assert_eq!(stored.version, written.version);
        let created = store.find_field(FieldId(2)).await.unwrap().unwrap();
        assert_eq!(untouched.version, 1);
        assert_eq!(created.version, untouched.version);
    }

    #[tokio::test]
    async fn read_after_write_is_rejected() {
        let (_, store) = stores();
        let err = run_transaction(&store, |tx| {
            Box::pin(async move {
                tx.put_player(PlayerEntity::new(
                    PlayerId::from("x"),
                    std::time::SystemTime::UNIX_EPOCH,
                ));
                tx.get_field(FieldId(1)).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(store.find_player(PlayerId::from("x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn body_error_writes_nothing() {
        let (_, store) = stores();
        let result: Result<(), _> = run_transaction(&store, |tx| {
            Box::pin(async move {
                tx.get_field(FieldId(1)).await?;
                Err(ServiceError::FieldUnavailable(FieldId(1)))
            })
        })
        .await;

        assert!(matches!(result, Err(ServiceError::FieldUnavailable(_))));
    }

    #[tokio::test]
    async fn conflicting_body_is_retried_then_exhausted() {
        let (memory, store) = stores();
        memory
            .seed_field(&FieldRecord::default().hydrate(FieldId(1)))
            .await
            .unwrap();
        let attempts = Arc::new(AtomicU32::new(0));

        let err = run_transaction(&store, |tx| {
            let memory = memory.clone();
            let attempts = attempts.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                let field = tx.get_field(FieldId(1)).await?.unwrap();
                // A concurrent writer bumps the version after every read.
                memory.seed_field(&field).await?;
                tx.put_field(field);
                Ok(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::TransactionConflictExhausted { attempts: 5 }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_TRANSACTION_ATTEMPTS);
    }
}
