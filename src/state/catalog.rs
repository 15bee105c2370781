use std::collections::HashSet;

use indexmap::{IndexMap, map::Entry};
use tracing::debug;

use crate::{
    dao::{
        field_store::Versioned,
        models::{FieldEntity, FieldId, FieldSize, FieldStatus, SurfaceType},
    },
    state::geo::Position,
};

/// In-memory view of the catalog that only absorbs server-confirmed records.
///
/// Merging upserts by id and never drops unrelated entries, so favorites or chat-history
/// fields outside the current viewport survive a refresh. Each entry remembers the store
/// version it was confirmed at; a record older than the cached one is ignored, so a slow
/// search cannot roll back a check-in that landed after its read.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: IndexMap<FieldId, Versioned<FieldEntity>>,
}

impl FieldCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert every confirmed record by id unless the cached entry is newer.
    ///
    /// Returns how many records were ignored as stale. Other entries are untouched.
    pub fn merge_confirmed(
        &mut self,
        confirmed: impl IntoIterator<Item = Versioned<FieldEntity>>,
    ) -> usize {
        let mut stale = 0;
        for field in confirmed {
            match self.fields.entry(field.value.id) {
                Entry::Vacant(entry) => {
                    entry.insert(field);
                }
                Entry::Occupied(mut entry) if field.supersedes(entry.get()) => {
                    entry.insert(field);
                }
                Entry::Occupied(entry) => {
                    debug!(
                        field_id = %field.value.id,
                        cached = entry.get().version,
                        incoming = field.version,
                        "ignoring stale field record"
                    );
                    stale += 1;
                }
            }
        }
        stale
    }

    /// Entry for `id`, if known.
    pub fn get(&self, id: FieldId) -> Option<&FieldEntity> {
        self.fields.get(&id).map(|field| &field.value)
    }

    /// Store version the entry for `id` was confirmed at.
    pub fn version(&self, id: FieldId) -> Option<u64> {
        self.fields.get(&id).map(|field| field.version)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldEntity> {
        self.fields.values().map(|field| &field.value)
    }

    /// Entries within `radius_m` of `center` passing `filter`, nearest first.
    pub fn nearby(&self, center: Position, radius_m: f64, filter: &FieldFilter) -> Vec<FieldEntity> {
        let mut matches: Vec<(f64, &FieldEntity)> = self
            .iter()
            .map(|field| (center.distance_to(&field.position), field))
            .filter(|(distance, field)| *distance <= radius_m && filter.matches(field))
            .collect();
        matches.sort_by(|a, b| a.0.total_cmp(&b.0));
        matches.into_iter().map(|(_, field)| field.clone()).collect()
    }
}

/// Catalog filters offered by the map view. Defaults let everything through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    /// When set, only these fields pass.
    pub favorites: Option<HashSet<FieldId>>,
    /// Minimum number of present players.
    pub min_players: usize,
    /// Minimum rating.
    pub min_rating: f64,
    /// Only fields hosting tournaments.
    pub has_tournaments: bool,
    /// Hide closed fields.
    pub open_only: bool,
    /// Required surface.
    pub surface: Option<SurfaceType>,
    /// Only lit fields.
    pub lit_only: bool,
    /// Required size.
    pub size: Option<FieldSize>,
}

impl FieldFilter {
    /// Whether `field` passes every active filter.
    pub fn matches(&self, field: &FieldEntity) -> bool {
        self.favorites
            .as_ref()
            .is_none_or(|favorites| favorites.contains(&field.id))
            && field.players.len() >= self.min_players
            && field.rating >= self.min_rating
            && (!self.has_tournaments || !field.tournaments.is_empty())
            && (!self.open_only || field.status != FieldStatus::Closed)
            && self.surface.is_none_or(|surface| field.surface == surface)
            && (!self.lit_only || field.lighting)
            && self.size.is_none_or(|size| field.size == size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::FieldRecord;

    fn field(id: i64, lat: f64) -> Versioned<FieldEntity> {
        at_version(id, lat, 1)
    }

    fn at_version(id: i64, lat: f64, version: u64) -> Versioned<FieldEntity> {
        let mut field = FieldRecord::default().hydrate(FieldId(id));
        field.position = Position::new(lat, 0.0);
        Versioned {
            value: field,
            version,
        }
    }

    #[test]
    fn merge_keeps_unrelated_entries() {
        let mut catalog = FieldCatalog::new();
        catalog.merge_confirmed([field(1, 0.0), field(2, 0.0)]);

        let mut updated = at_version(2, 0.0, 2);
        updated.value.name = "Updated".into();
        catalog.merge_confirmed([updated, field(3, 0.0)]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(FieldId(2)).unwrap().name, "Updated");
        assert!(catalog.get(FieldId(1)).is_some());
        let order: Vec<_> = catalog.iter().map(|f| f.id).collect();
        assert_eq!(order, vec![FieldId(1), FieldId(2), FieldId(3)]);
    }

    #[test]
    fn older_record_never_replaces_newer_one() {
        let mut catalog = FieldCatalog::new();
        let mut checked_in = at_version(7, 0.0, 4);
        checked_in.value.name = "After check-in".into();
        catalog.merge_confirmed([checked_in]);

        let mut late_search = at_version(7, 0.0, 3);
        late_search.value.name = "Before check-in".into();
        let stale = catalog.merge_confirmed([late_search, field(8, 0.0)]);

        assert_eq!(stale, 1);
        assert_eq!(catalog.get(FieldId(7)).unwrap().name, "After check-in");
        assert_eq!(catalog.version(FieldId(7)), Some(4));
        assert!(catalog.get(FieldId(8)).is_some());

        let mut same_version = at_version(7, 0.0, 4);
        same_version.value.name = "Re-read".into();
        assert_eq!(catalog.merge_confirmed([same_version]), 0);
        assert_eq!(catalog.get(FieldId(7)).unwrap().name, "Re-read");
    }

    #[test]
    fn nearby_sorts_by_distance_and_applies_radius() {
        let mut catalog = FieldCatalog::new();
        catalog.merge_confirmed([field(1, 0.02), field(2, 0.01), field(3, 1.0)]);

        let found = catalog.nearby(Position::new(0.0, 0.0), 5_000.0, &FieldFilter::default());
        let ids: Vec<_> = found.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![FieldId(2), FieldId(1)]);
    }

    #[test]
    fn filters_combine() {
        let mut lit_grass = field(1, 0.0).value;
        lit_grass.lighting = true;
        lit_grass.surface = SurfaceType::Grass;
        let mut closed = field(2, 0.0).value;
        closed.status = FieldStatus::Closed;

        let filter = FieldFilter {
            open_only: true,
            lit_only: true,
            surface: Some(SurfaceType::Grass),
            ..FieldFilter::default()
        };
        assert!(filter.matches(&lit_grass));
        assert!(!filter.matches(&closed));

        let favorites_only = FieldFilter {
            favorites: Some(HashSet::from([FieldId(2)])),
            ..FieldFilter::default()
        };
        assert!(!favorites_only.matches(&lit_grass));
        assert!(favorites_only.matches(&closed));
    }
}
