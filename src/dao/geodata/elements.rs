//! Raw provider payloads and their mapping onto field drafts.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::{
    dao::models::{
        DEFAULT_FIELD_NAME, FieldEntity, FieldId, FieldSize, FieldStatus, SurfaceType,
    },
    state::geo::Position,
};

/// Top-level Overpass JSON answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    /// Matched elements.
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

/// OSM element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Point with its own coordinate.
    Node,
    /// Polyline/polygon; located by its centroid.
    Way,
    /// Group of members; located by its centroid.
    Relation,
    /// Anything newer than this client knows about.
    #[serde(other)]
    Other,
}

/// Centroid emitted by `out center;`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Center {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// One element of the provider answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawElement {
    /// Element kind.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Provider id, stable across fetches.
    pub id: i64,
    /// Node latitude.
    #[serde(default)]
    pub lat: Option<f64>,
    /// Node longitude.
    #[serde(default)]
    pub lon: Option<f64>,
    /// Way/relation centroid.
    #[serde(default)]
    pub center: Option<Center>,
    /// OSM tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RawElement {
    /// Node coordinate, else the centroid.
    pub fn position(&self) -> Option<Position> {
        match (self.lat, self.lon, self.center) {
            (Some(lat), Some(lon), _) => Some(Position::new(lat, lon)),
            (_, _, Some(center)) => Some(Position::new(center.lat, center.lon)),
            _ => None,
        }
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Map the OSM `surface` tag onto a playing surface.
pub fn surface_from_tag(tag: Option<&str>) -> SurfaceType {
    match tag {
        Some("grass" | "natural_grass") => SurfaceType::Grass,
        Some("artificial_turf" | "artificial") => SurfaceType::Rubber,
        Some("concrete") => SurfaceType::Hall,
        Some("asphalt") => SurfaceType::Asphalt,
        Some("sand") => SurfaceType::Sand,
        _ => SurfaceType::Rubber,
    }
}

/// Provider-side view of a field: where it is and how it is tagged, no community state.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDraft {
    /// Provider id.
    pub id: FieldId,
    /// `name` tag, or [`DEFAULT_FIELD_NAME`].
    pub name: String,
    /// Node coordinate or centroid.
    pub position: Position,
    /// Mapped surface.
    pub surface: SurfaceType,
    /// `lit=yes`.
    pub lighting: bool,
    /// Derived from the id.
    pub size: FieldSize,
}

impl FieldDraft {
    /// Map a raw element. Elements without any coordinate are skipped.
    pub fn from_element(element: &RawElement) -> Option<Self> {
        let Some(position) = element.position() else {
            warn!(id = element.id, kind = ?element.kind, "skipping element without coordinates");
            return None;
        };
        let id = FieldId(element.id);
        let name = element
            .tag("name")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FIELD_NAME)
            .to_string();

        Some(Self {
            id,
            name,
            position,
            surface: surface_from_tag(element.tag("surface")),
            lighting: element.tag("lit") == Some("yes"),
            size: FieldSize::from_id(id),
        })
    }

    /// Fresh catalog entry for a first sighting.
    pub fn into_field(self, photo: String) -> FieldEntity {
        FieldEntity {
            id: self.id,
            name: self.name,
            position: self.position,
            status: FieldStatus::Available,
            surface: self.surface,
            lighting: self.lighting,
            size: self.size,
            rating: 0.0,
            players: Vec::new(),
            reviews: Vec::new(),
            last_message: None,
            photo,
            tournaments: Vec::new(),
        }
    }
}

/// Map every usable element of a provider answer.
pub fn drafts_from_elements(elements: &[RawElement]) -> Vec<FieldDraft> {
    elements.iter().filter_map(FieldDraft::from_element).collect()
}
