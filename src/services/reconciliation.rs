//! Merge of freshly fetched provider drafts with persisted community state.
//!
//! The provider is authoritative for where a field is and how it is tagged; the store is
//! authoritative for everything players accumulated (presence, reviews, rating, chat pointer,
//! tournaments). [`reconcile`] is a pure function: it returns the merged view together with the
//! writes it needs, and [`commit_writes`] persists those writes in bounded batches.

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::Rng;
use tracing::{info, warn};

use crate::{
    dao::{
        field_store::{FieldStore, WriteOp},
        geodata::{FieldDraft, ImagePool},
        models::{FieldEntity, FieldId},
    },
    error::ServiceError,
};

/// Which stored names and photos are placeholders that a refresh may overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRules {
    /// Exact placeholder names.
    pub names: Vec<String>,
    /// Name prefixes marking generated names.
    pub name_prefixes: Vec<String>,
    /// Substrings marking stock placeholder photos.
    pub photo_markers: Vec<String>,
}

impl PlaceholderRules {
    /// Whether `name` is generated rather than given by someone.
    pub fn is_placeholder_name(&self, name: &str) -> bool {
        let name = name.trim();
        name.is_empty()
            || self.names.iter().any(|placeholder| placeholder == name)
            || self
                .name_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Whether `photo` is missing or a stock placeholder.
    pub fn is_placeholder_photo(&self, photo: &str) -> bool {
        photo.trim().is_empty()
            || self
                .photo_markers
                .iter()
                .any(|marker| photo.contains(marker.as_str()))
    }
}

/// Result of merging one fetch.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    /// Merged view, in provider order.
    pub fields: Vec<FieldEntity>,
    /// Writes to persist: creates for first sightings, photo updates for backfills.
    pub writes: Vec<WriteOp>,
}

/// Merge `drafts` with the `persisted` records of the same ids.
///
/// - First sighting: the draft becomes a new entry (with a pool photo when the pool is not
///   empty) and a create is scheduled.
/// - Known id: community state is kept as stored. Position always follows the provider; the
///   name follows the provider unless the stored one is real. A placeholder photo is replaced
///   from the pool and a photo-only update is scheduled.
///
/// Duplicate draft ids collapse onto the first occurrence, later drafts overriding its tags.
/// Position and name changes only affect the returned view, so a repeated pass over the same
/// data schedules nothing but photo backfills.
pub fn reconcile<R: Rng + ?Sized>(
    drafts: Vec<FieldDraft>,
    persisted: Vec<FieldEntity>,
    pool: &ImagePool,
    rules: &PlaceholderRules,
    rng: &mut R,
) -> Reconciled {
    let mut unique: IndexMap<FieldId, FieldDraft> = IndexMap::with_capacity(drafts.len());
    for draft in drafts {
        unique.insert(draft.id, draft);
    }

    let mut persisted: HashMap<FieldId, FieldEntity> = persisted
        .into_iter()
        .map(|field| (field.id, field))
        .collect();

    let mut reconciled = Reconciled::default();
    for (id, draft) in unique {
        match persisted.remove(&id) {
            None => {
                let photo = pool.pick(rng).map(str::to_string).unwrap_or_default();
                let field = draft.into_field(photo);
                reconciled.writes.push(WriteOp::CreateField(field.clone()));
                reconciled.fields.push(field);
            }
            Some(mut field) => {
                field.position = draft.position;
                if rules.is_placeholder_name(&field.name) {
                    field.name = draft.name;
                }
                if rules.is_placeholder_photo(&field.photo) {
                    if let Some(photo) = pool.pick(rng) {
                        field.photo = photo.to_string();
                        reconciled.writes.push(WriteOp::UpdateFieldPhoto {
                            id,
                            photo: field.photo.clone(),
                        });
                    }
                }
                reconciled.fields.push(field);
            }
        }
    }
    reconciled
}

/// Outcome of persisting reconciliation writes.
#[derive(Debug)]
pub struct CommitReport {
    /// Batches committed.
    pub committed_batches: usize,
    /// Fields whose writes did not make it to the store.
    pub unsaved: Vec<FieldId>,
    /// Failure that stopped the commit, if any.
    pub failure: Option<ServiceError>,
}

/// Persist `writes` in batches of at most `batch_limit` operations.
///
/// Batches are atomic one by one, not as a whole. The first failing batch stops the commit;
/// the ids touched by it and by every later batch are reported as unsaved.
pub async fn commit_writes(
    store: &dyn FieldStore,
    writes: Vec<WriteOp>,
    batch_limit: usize,
) -> CommitReport {
    let mut report = CommitReport {
        committed_batches: 0,
        unsaved: Vec::new(),
        failure: None,
    };
    if writes.is_empty() {
        return report;
    }

    let total = writes.len();
    let batches: Vec<Vec<WriteOp>> = writes
        .chunks(batch_limit.max(1))
        .map(<[WriteOp]>::to_vec)
        .collect();

    let mut pending = batches.into_iter();
    for batch in pending.by_ref() {
        let ids: Vec<FieldId> = batch.iter().filter_map(field_id_of).collect();
        match store.commit_batch(batch).await {
            Ok(()) => report.committed_batches += 1,
            Err(source) => {
                warn!(
                    committed = report.committed_batches,
                    error = %source,
                    "reconciliation batch failed; skipping remaining batches"
                );
                report.unsaved.extend(ids);
                report.failure = Some(ServiceError::PersistenceWriteFailure {
                    committed_batches: report.committed_batches,
                    source,
                });
                break;
            }
        }
    }
    for batch in pending {
        report.unsaved.extend(batch.iter().filter_map(field_id_of));
    }

    if report.failure.is_none() {
        info!(
            writes = total,
            batches = report.committed_batches,
            "persisted reconciliation writes"
        );
    }
    report
}

fn field_id_of(write: &WriteOp) -> Option<FieldId> {
    match write {
        WriteOp::CreateField(field) | WriteOp::PutField(field) => Some(field.id),
        WriteOp::UpdateFieldPhoto { id, .. } => Some(*id),
        WriteOp::CreatePlayer(_) | WriteOp::PutPlayer(_) => None,
    }
}
