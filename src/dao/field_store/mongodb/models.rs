use mongodb::bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::{
    field_store::{DocKey, Versioned},
    models::{FieldEntity, FieldId, FieldRecord, PlayerEntity, PlayerId, PlayerRecord},
};

/// `fields` document: the record attributes plus `_id` and the optimistic `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFieldDocument {
    #[serde(rename = "_id")]
    id: FieldId,
    #[serde(default)]
    version: i64,
    #[serde(flatten)]
    record: FieldRecord,
}

impl MongoFieldDocument {
    /// Document for `field` stamped with `version`.
    pub fn new(field: &FieldEntity, version: i64) -> Self {
        Self {
            id: field.id,
            version,
            record: field.into(),
        }
    }

    /// Hydrate the record, keeping the stored version.
    pub fn into_versioned(self) -> Versioned<FieldEntity> {
        Versioned {
            value: self.record.hydrate(self.id),
            version: version_from_i64(self.version),
        }
    }
}

/// `players` document, same layout as [`MongoFieldDocument`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: PlayerId,
    #[serde(default)]
    version: i64,
    #[serde(flatten)]
    record: PlayerRecord,
}

impl MongoPlayerDocument {
    /// Document for `player` stamped with `version`.
    pub fn new(player: &PlayerEntity, version: i64) -> Self {
        Self {
            id: player.id.clone(),
            version,
            record: player.into(),
        }
    }

    /// Hydrate the record, keeping the stored version. Missing join dates default to now.
    pub fn into_versioned(self) -> Versioned<PlayerEntity> {
        let now = std::time::SystemTime::now();
        Versioned {
            value: self.record.hydrate(self.id, now),
            version: version_from_i64(self.version),
        }
    }
}

/// `_id` filter addressing `key`.
pub fn doc_id(key: &DocKey) -> Document {
    match key {
        DocKey::Field(id) => doc! { "_id": id.0 },
        DocKey::Player(id) => doc! { "_id": id.as_str() },
    }
}

/// Version stored on a raw document; documents written before versioning count as 0.
pub fn stored_version(document: &Document) -> i64 {
    match document.get("version") {
        Some(Bson::Int64(version)) => *version,
        Some(Bson::Int32(version)) => i64::from(*version),
        _ => 0,
    }
}

/// Stored version as `u64`; negative values count as 0.
pub fn version_from_i64(version: i64) -> u64 {
    u64::try_from(version).unwrap_or(0)
}

/// Version as stored by MongoDB.
pub fn version_to_i64(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}
