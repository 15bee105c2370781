use std::{future::Future, hash::Hash};

use futures::future::try_join_all;
use indexmap::IndexSet;

use crate::dao::{
    field_store::{FieldStore, Versioned},
    models::{FieldEntity, FieldId, PlayerEntity, PlayerId},
    storage::StorageResult,
};

/// Resolve an id set of any size against a backend whose containment queries accept at most
/// `chunk_size` ids.
///
/// Duplicate ids are dropped (first occurrence wins), the rest is split into ordered chunks
/// and one query is issued per chunk. Results are concatenated in chunk order; ids the
/// backend does not know are simply absent. The first failing chunk fails the lookup.
pub async fn chunked_lookup<K, T, E, F, Fut>(
    ids: impl IntoIterator<Item = K>,
    chunk_size: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    K: Eq + Hash + Clone,
    F: FnMut(Vec<K>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let unique: IndexSet<K> = ids.into_iter().collect();
    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let unique: Vec<K> = unique.into_iter().collect();
    let pages = unique
        .chunks(chunk_size.max(1))
        .map(|chunk| fetch_page(chunk.to_vec()))
        .collect::<Vec<_>>();

    let results = try_join_all(pages).await?;
    Ok(results.into_iter().flatten().collect())
}

/// Re-hydrate fields by id, keeping the version each was read at.
pub async fn fields_by_ids(
    store: &dyn FieldStore,
    ids: impl IntoIterator<Item = FieldId>,
    chunk_size: usize,
) -> StorageResult<Vec<Versioned<FieldEntity>>> {
    chunked_lookup(ids, chunk_size, |chunk| store.find_fields_by_ids(chunk)).await
}

/// Re-hydrate players by id.
pub async fn players_by_ids(
    store: &dyn FieldStore,
    ids: impl IntoIterator<Item = PlayerId>,
    chunk_size: usize,
) -> StorageResult<Vec<PlayerEntity>> {
    chunked_lookup(ids, chunk_size, |chunk| store.find_players_by_ids(chunk)).await
}
