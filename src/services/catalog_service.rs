//! Catalog searches: provider fetch, reconciliation with stored community state, and the
//! cached view served to map clients.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::{
    dao::{
        field_store::Versioned,
        geodata::elements::drafts_from_elements,
        models::{FieldEntity, FieldId, FieldRecord, FieldSize, PlayerId, SurfaceType},
    },
    error::ServiceError,
    services::{
        chunked_lookup::fields_by_ids,
        reconciliation::{Reconciled, commit_writes, reconcile},
        sse_events,
        transaction::run_transaction,
    },
    state::{SharedState, catalog::FieldFilter, geo::Position},
};

/// Notice attached to a search whose writes could not all be persisted.
pub const PERSISTENCE_NOTICE: &str = "Could not load all fields; showing what was saved.";

/// Consecutive ids tried after the minted one before a submission gives up.
pub const SUBMIT_ID_ATTEMPTS: i64 = 16;

/// Fields returned by a search.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Confirmed fields in provider order.
    pub fields: Vec<FieldEntity>,
    /// User-facing notice when part of the pass could not be persisted.
    pub notice: Option<String>,
}

/// Attributes of a user-submitted field.
#[derive(Debug, Clone)]
pub struct FieldSubmission {
    /// Display name.
    pub name: String,
    /// Location.
    pub position: Position,
    /// Playing surface.
    pub surface: SurfaceType,
    /// Floodlights.
    pub lighting: bool,
    /// Pitch size.
    pub size: FieldSize,
    /// Photo URL; a placeholder is used when missing.
    pub photo: Option<String>,
}

/// Search the provider around `center`, merge the results with stored community state and
/// fold the confirmed records into the shared catalog.
///
/// A provider outage fails with [`ServiceError::ProviderUnavailable`] and leaves the catalog
/// untouched. A failed write batch does not fail the search: the fields it carried are left
/// out and a notice is returned instead.
pub async fn fetch_fields(
    state: &SharedState,
    center: Position,
    radius_m: f64,
) -> Result<FetchOutcome, ServiceError> {
    let store = state.require_field_store().await?;
    let config = state.config();

    let (elements, pool) = tokio::join!(
        state.geodata().fetch_elements(center, radius_m),
        state.images().fetch_pool()
    );
    let elements = elements.map_err(|err| {
        warn!(error = %err, lat = center.lat, lng = center.lng, "geodata fetch failed");
        ServiceError::ProviderUnavailable(err)
    })?;
    let pool = pool.unwrap_or_else(|err| {
        warn!(error = %err, "image pool unavailable; photos will not be backfilled");
        Default::default()
    });

    let drafts = drafts_from_elements(&elements);
    let persisted = fields_by_ids(
        store.as_ref(),
        drafts.iter().map(|draft| draft.id),
        config.lookup_chunk_size,
    )
    .await?;
    let read_versions: HashMap<FieldId, u64> = persisted
        .iter()
        .map(|field| (field.value.id, field.version))
        .collect();
    let persisted = persisted.into_iter().map(|field| field.value).collect();

    let Reconciled { fields, writes } = {
        let mut rng = rand::rng();
        reconcile(drafts, persisted, &pool, &config.placeholders, &mut rng)
    };
    let report = commit_writes(store.as_ref(), writes, config.batch_limit).await;

    let unsaved: HashSet<FieldId> = report.unsaved.into_iter().collect();
    let confirmed: Vec<Versioned<FieldEntity>> = fields
        .into_iter()
        .filter(|field| !unsaved.contains(&field.id))
        .map(|field| Versioned {
            // Photo backfills are unconditional writes, so only the read version is known.
            version: read_versions.get(&field.id).copied().unwrap_or(0),
            value: field,
        })
        .collect();
    let ids: Vec<FieldId> = confirmed.iter().map(|field| field.value.id).collect();

    // Fields a concurrent transition made newer are served from the catalog instead.
    let confirmed: Vec<FieldEntity> = {
        let mut catalog = state.catalog().write().await;
        catalog.merge_confirmed(confirmed);
        ids.into_iter()
            .filter_map(|id| catalog.get(id).cloned())
            .collect()
    };

    let notice = report.failure.map(|err| {
        warn!(error = %err, unsaved = unsaved.len(), "search finished with unsaved fields");
        PERSISTENCE_NOTICE.to_string()
    });
    info!(found = confirmed.len(), radius_m, "field search complete");

    Ok(FetchOutcome {
        fields: confirmed,
        notice,
    })
}

/// Cached catalog entries around `center` that pass `filter`, nearest first.
pub async fn nearby(
    state: &SharedState,
    center: Position,
    radius_m: f64,
    mut filter: FieldFilter,
    favorites_of: Option<PlayerId>,
) -> Result<Vec<FieldEntity>, ServiceError> {
    if let Some(player_id) = favorites_of {
        let store = state.require_field_store().await?;
        let player = store
            .find_player(player_id.clone())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;
        filter.favorites = Some(player.value.favorite_fields.into_iter().collect());
    }

    let catalog = state.catalog().read().await;
    Ok(catalog.nearby(center, radius_m, &filter))
}

/// Read one field from storage and refresh its catalog entry.
pub async fn get_field(state: &SharedState, id: FieldId) -> Result<FieldEntity, ServiceError> {
    let store = state.require_field_store().await?;
    let field = store
        .find_field(id)
        .await?
        .ok_or(ServiceError::FieldUnavailable(id))?;
    state.catalog().write().await.merge_confirmed([field.clone()]);
    Ok(field.value)
}

/// Create a user-submitted field under a freshly minted id.
///
/// The id comes from the clock; when it is already taken (two submissions in the same
/// millisecond, or a provider id in that range) the next free id is used. The absence of the
/// chosen id is part of the transaction's read set, so two submissions racing for the same
/// id cannot both commit and neither ever overwrites an existing document.
pub async fn submit_field(
    state: &SharedState,
    submission: FieldSubmission,
) -> Result<FieldEntity, ServiceError> {
    let store = state.require_field_store().await?;
    let minted = FieldId::mint(state.clock().now());

    let stored = run_transaction(&store, |tx| {
        let submission = submission.clone();
        Box::pin(async move {
            let mut id = None;
            for candidate in (0..SUBMIT_ID_ATTEMPTS).map(|offset| FieldId(minted.0 + offset)) {
                if tx.get_field(candidate).await?.is_none() {
                    id = Some(candidate);
                    break;
                }
            }
            let id = id.ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "no free field id in {SUBMIT_ID_ATTEMPTS} tries from {minted}"
                ))
            })?;

            let field = submitted_field(id, submission);
            tx.put_field(field.clone());
            Ok(tx.committed_field(field))
        })
    })
    .await?;

    info!(
        field_id = %stored.value.id,
        name = %stored.value.name,
        minted = %minted,
        "field submitted"
    );
    state.catalog().write().await.merge_confirmed([stored.clone()]);
    sse_events::broadcast_field_updated(state, &stored.value);
    Ok(stored.value)
}

fn submitted_field(id: FieldId, submission: FieldSubmission) -> FieldEntity {
    let mut field = FieldRecord::default().hydrate(id);
    field.name = submission.name.trim().to_string();
    field.position = submission.position;
    field.surface = submission.surface;
    field.lighting = submission.lighting;
    field.size = submission.size;
    field.photo = submission
        .photo
        .filter(|photo| !photo.trim().is_empty())
        .unwrap_or_else(|| placeholder_photo(id));
    field
}

/// Fields with the most recent chat activity, refreshed into the catalog.
pub async fn recent_chats(state: &SharedState) -> Result<Vec<FieldEntity>, ServiceError> {
    let store = state.require_field_store().await?;
    let fields = store
        .recent_chat_fields(state.config().recent_chats_limit)
        .await?;
    state
        .catalog()
        .write()
        .await
        .merge_confirmed(fields.iter().cloned());
    Ok(fields.into_iter().map(|field| field.value).collect())
}

fn placeholder_photo(id: FieldId) -> String {
    format!("https://source.unsplash.com/800x600/?soccer,stadium,pitch&sig={id}")
}
