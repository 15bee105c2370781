//! Persisted catalog records and their hydration into fully-populated entities.
//!
//! Backends store [`FieldRecord`] / [`PlayerRecord`] documents in which every attribute is
//! optional, because documents written by older clients routinely miss attributes or carry
//! `null`. Reading always goes through `hydrate`, which fills the documented defaults so the
//! rest of the crate only ever sees complete [`FieldEntity`] / [`PlayerEntity`] values.

use std::{
    collections::HashSet,
    fmt,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_with::{DefaultOnError, DeserializeAs, SerializeAs, VecSkipError, serde_as};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;
use utoipa::ToSchema;

use crate::state::{geo::Position, presence::Presence};

/// Name given to provider elements that carry no `name` tag.
pub const DEFAULT_FIELD_NAME: &str = "Football Venue";

/// Stable field identifier: the provider element id, or a client-minted id for submissions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct FieldId(pub i64);

impl FieldId {
    /// Mint an id for a user-submitted field from the submission time (Unix milliseconds).
    pub fn mint(at: SystemTime) -> Self {
        FieldId(to_millis(at))
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier of a player.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap an account id.
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        PlayerId(value.to_string())
    }
}

/// Operational status of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum FieldStatus {
    /// Open and free to use.
    #[default]
    Available,
    /// Open but crowded.
    Busy,
    /// Not usable.
    Closed,
}

/// Playing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceType {
    /// Indoor hall or concrete court.
    Hall,
    /// Beach / sand pitch.
    Sand,
    /// Natural grass.
    Grass,
    /// Artificial turf or rubber.
    #[default]
    Rubber,
    /// Asphalt court.
    Asphalt,
}

/// Rough pitch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldSize {
    /// Small-sided pitch.
    Small,
    /// Medium pitch.
    #[default]
    Medium,
    /// Full-size pitch.
    Large,
}

impl FieldSize {
    /// Deterministic size for provider elements, which carry no size tag.
    pub fn from_id(id: FieldId) -> Self {
        match id.0.rem_euclid(3) {
            0 => FieldSize::Small,
            1 => FieldSize::Medium,
            _ => FieldSize::Large,
        }
    }
}

/// Entry in a field's list of present players.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPlayerEntity {
    /// Player occupying the field.
    pub player_id: PlayerId,
    /// Display name at check-in time.
    #[serde(default)]
    pub name: String,
    /// Avatar URL at check-in time.
    #[serde(default)]
    pub avatar: String,
    /// When the player checked in; legacy entries may not have it.
    #[serde_as(
        serialize_as = "Option<LenientTimestamp>",
        deserialize_as = "DefaultOnError<Option<LenientTimestamp>>"
    )]
    #[serde(default)]
    pub check_in_time: Option<SystemTime>,
}

/// Review left by a player.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntity {
    /// Review identifier.
    pub id: String,
    /// Author account.
    pub author_id: PlayerId,
    /// Author display name.
    #[serde(default)]
    pub author_name: String,
    /// Author avatar URL.
    #[serde(default)]
    pub author_avatar: String,
    /// Stars between 1 and 5.
    pub rating: u8,
    /// Free text, possibly empty for rating-only reviews.
    #[serde(default)]
    pub comment: String,
    /// Creation (or last edit) time.
    #[serde_as(as = "LenientTimestamp")]
    #[serde(default = "unix_epoch")]
    pub created_at: SystemTime,
}

/// Pointer to the last message of a field's chat; the history lives elsewhere.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPointerEntity {
    /// Identifier of the message.
    pub message_id: String,
    /// Author account.
    pub author_id: PlayerId,
    /// Author display name.
    #[serde(default)]
    pub author_name: String,
    /// Message text (possibly truncated by the writer).
    #[serde(default)]
    pub text: String,
    /// Send time.
    #[serde_as(as = "LenientTimestamp")]
    #[serde(default = "unix_epoch")]
    pub sent_at: SystemTime,
}

/// Tournament hosted on a field. Only the identifying attributes are typed; every other key
/// written by the tournament tooling is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentEntity {
    /// Tournament identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Organizer account.
    #[serde(default)]
    pub creator_id: Option<PlayerId>,
    /// `open`, `ongoing` or `completed`.
    #[serde(default)]
    pub status: String,
    /// Remaining attributes, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fully hydrated field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntity {
    /// Stable identifier.
    pub id: FieldId,
    /// Display name.
    pub name: String,
    /// Location.
    pub position: Position,
    /// Operational status.
    pub status: FieldStatus,
    /// Playing surface.
    pub surface: SurfaceType,
    /// Whether the field is lit.
    pub lighting: bool,
    /// Pitch size.
    pub size: FieldSize,
    /// Mean review rating rounded to one decimal.
    pub rating: f64,
    /// Players currently present; never contains the same player twice.
    pub players: Vec<FieldPlayerEntity>,
    /// Reviews, at most one per author.
    pub reviews: Vec<ReviewEntity>,
    /// Last chat message, if any.
    pub last_message: Option<ChatPointerEntity>,
    /// Photo URL, empty when unknown.
    pub photo: String,
    /// Tournaments hosted here.
    pub tournaments: Vec<TournamentEntity>,
}

impl FieldEntity {
    /// Whether `player_id` is listed as present.
    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.player_id == player_id)
    }

    /// Drop `player_id` from the present players. Returns whether an entry was removed.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| &p.player_id != player_id);
        before != self.players.len()
    }

    /// Insert `entry`, replacing any stale entry for the same player.
    pub fn upsert_player(&mut self, entry: FieldPlayerEntity) {
        self.remove_player(&entry.player_id);
        self.players.push(entry);
    }

    /// Recompute [`FieldEntity::rating`] from the current reviews.
    pub fn refresh_rating(&mut self) {
        self.rating = average_rating(&self.reviews);
    }
}

/// Mean of review ratings rounded to one decimal; zero without reviews.
pub fn average_rating(reviews: &[ReviewEntity]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    let mean = f64::from(sum) / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Activity counters of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PlayerStats {
    /// Games played.
    pub games_played: u32,
    /// Distinct visits that lasted at least the dwell threshold.
    pub fields_visited: u32,
    /// Reviews written.
    pub reviews_left: u32,
    /// Points earned from missions.
    pub mission_points: u32,
}

/// Fully hydrated player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntity {
    /// Account id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// User-chosen handle.
    pub handle: String,
    /// Contact email.
    pub email: String,
    /// Avatar URL.
    pub avatar: String,
    /// Registration time.
    pub join_date: SystemTime,
    /// Activity counters.
    pub stats: PlayerStats,
    /// Favorite fields.
    pub favorite_fields: Vec<FieldId>,
    /// Confirmed friends.
    pub friends: Vec<PlayerId>,
    /// Outgoing pending requests.
    pub friend_requests_sent: Vec<PlayerId>,
    /// Incoming pending requests.
    pub friend_requests_received: Vec<PlayerId>,
    /// Current field, if checked in.
    pub presence: Presence,
    /// Overall player rating.
    pub rating: u32,
    /// Player level.
    pub level: u32,
    /// Experience points.
    pub experience: u32,
    /// Unlocked achievement ids.
    pub achievements: Vec<String>,
}

impl PlayerEntity {
    /// Fresh profile with every attribute at its default.
    pub fn new(id: PlayerId, now: SystemTime) -> Self {
        PlayerRecord::default().hydrate(id, now)
    }

    /// Entry describing this player in a field's present list.
    pub fn as_field_player(&self, check_in_time: SystemTime) -> FieldPlayerEntity {
        FieldPlayerEntity {
            player_id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            check_in_time: Some(check_in_time),
        }
    }

    /// Social relation between this player and `other`, from this player's side.
    pub fn relation_to(&self, other: &PlayerId) -> FriendRelation {
        if self.friends.contains(other) {
            FriendRelation::Friends
        } else if self.friend_requests_received.contains(other) {
            FriendRelation::RequestReceived
        } else if self.friend_requests_sent.contains(other) {
            FriendRelation::RequestSent
        } else {
            FriendRelation::None
        }
    }

    /// Drop `other` from every social set.
    pub fn forget(&mut self, other: &PlayerId) {
        self.friends.retain(|id| id != other);
        self.friend_requests_sent.retain(|id| id != other);
        self.friend_requests_received.retain(|id| id != other);
    }
}

/// Position of one player in another player's social graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FriendRelation {
    /// No link.
    None,
    /// Confirmed friends.
    Friends,
    /// A request was sent and is pending.
    RequestSent,
    /// A request was received and is pending.
    RequestReceived,
}

/// Stored form of a field. Every attribute may be missing on legacy documents.
///
/// An attribute of the wrong type reads as missing, and list entries that do not decode
/// are skipped, so one bad value never makes the whole document unreadable.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Display name.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    /// Latitude in degrees.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub lat: Option<f64>,
    /// Longitude in degrees.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub lng: Option<f64>,
    /// Operational status.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub status: Option<FieldStatus>,
    /// Playing surface.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub surface: Option<SurfaceType>,
    /// Floodlights.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub lighting: Option<bool>,
    /// Pitch size.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub size: Option<FieldSize>,
    /// Stored mean rating; recomputed from the reviews when missing.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub rating: Option<f64>,
    /// Players currently present.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub players: Option<Vec<FieldPlayerEntity>>,
    /// Reviews, one per author.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub reviews: Option<Vec<ReviewEntity>>,
    /// Pointer to the last chat message.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub last_message: Option<ChatPointerEntity>,
    /// Photo URL.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub photo: Option<String>,
    /// Tournaments hosted on the field.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub tournaments: Option<Vec<TournamentEntity>>,
}

impl FieldRecord {
    /// Build a complete field from a possibly partial document.
    ///
    /// Defaults: name [`DEFAULT_FIELD_NAME`], position (0, 0), status `Available`, surface
    /// `Rubber`, no lighting, size `Medium`, empty photo and collections. The stored rating
    /// wins; without one it is computed from the reviews. Duplicate player entries keep the
    /// first occurrence and reviews with out-of-range ratings are dropped.
    pub fn hydrate(self, id: FieldId) -> FieldEntity {
        let mut seen = HashSet::new();
        let mut players = self.players.unwrap_or_default();
        players.retain(|p| seen.insert(p.player_id.clone()));

        let mut reviews = self.reviews.unwrap_or_default();
        reviews.retain(|r| (1..=5).contains(&r.rating));
        let rating = self.rating.unwrap_or_else(|| average_rating(&reviews));

        FieldEntity {
            id,
            name: self.name.unwrap_or_else(|| DEFAULT_FIELD_NAME.to_string()),
            position: Position::new(self.lat.unwrap_or(0.0), self.lng.unwrap_or(0.0)),
            status: self.status.unwrap_or_default(),
            surface: self.surface.unwrap_or_default(),
            lighting: self.lighting.unwrap_or(false),
            size: self.size.unwrap_or_default(),
            rating,
            players,
            reviews,
            last_message: self.last_message,
            photo: self.photo.unwrap_or_default(),
            tournaments: self.tournaments.unwrap_or_default(),
        }
    }
}

impl From<&FieldEntity> for FieldRecord {
    fn from(field: &FieldEntity) -> Self {
        Self {
            name: Some(field.name.clone()),
            lat: Some(field.position.lat),
            lng: Some(field.position.lng),
            status: Some(field.status),
            surface: Some(field.surface),
            lighting: Some(field.lighting),
            size: Some(field.size),
            rating: Some(field.rating),
            players: Some(field.players.clone()),
            reviews: Some(field.reviews.clone()),
            last_message: field.last_message.clone(),
            photo: Some(field.photo.clone()),
            tournaments: Some(field.tournaments.clone()),
        }
    }
}

/// Stored form of a player. Every attribute may be missing on legacy documents.
///
/// Decoding is as forgiving as for [`FieldRecord`]. Timestamps are written as Unix
/// milliseconds and also read back from RFC 3339 strings.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Display name.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    /// User-chosen handle.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub handle: Option<String>,
    /// Contact email.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub avatar: Option<String>,
    /// Registration time.
    #[serde_as(
        serialize_as = "Option<LenientTimestamp>",
        deserialize_as = "DefaultOnError<Option<LenientTimestamp>>"
    )]
    #[serde(default)]
    pub join_date: Option<SystemTime>,
    /// Activity counters.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub stats: Option<PlayerStats>,
    /// Favorite fields.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub favorite_fields: Option<Vec<FieldId>>,
    /// Confirmed friends.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub friends: Option<Vec<PlayerId>>,
    /// Outgoing pending friend requests.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub friend_requests_sent: Option<Vec<PlayerId>>,
    /// Incoming pending friend requests.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub friend_requests_received: Option<Vec<PlayerId>>,
    /// Field the player is checked into; half of the presence pair.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub current_field_id: Option<FieldId>,
    /// Check-in time; the other half of the presence pair.
    #[serde_as(
        serialize_as = "Option<LenientTimestamp>",
        deserialize_as = "DefaultOnError<Option<LenientTimestamp>>"
    )]
    #[serde(default)]
    pub check_in_time: Option<SystemTime>,
    /// Overall player rating.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub rating: Option<u32>,
    /// Player level.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub level: Option<u32>,
    /// Experience points.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub experience: Option<u32>,
    /// Unlocked achievement ids.
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default)]
    pub achievements: Option<Vec<String>>,
}

impl PlayerRecord {
    /// Build a complete player from a possibly partial document.
    ///
    /// Defaults: name `Player`, handle `player`, empty email, a pravatar avatar seeded by the
    /// id, join date `now`, zeroed stats, rating 50, level 1, no experience. Presence is only
    /// restored when both the field id and the check-in time are stored; an orphaned half is
    /// dropped. Social sets are made disjoint with precedence friends, received, sent.
    pub fn hydrate(self, id: PlayerId, now: SystemTime) -> PlayerEntity {
        let presence = match (self.current_field_id, self.check_in_time) {
            (Some(field_id), Some(since)) => Presence::Present { field_id, since },
            (None, None) => Presence::Absent,
            (field_id, since) => {
                warn!(
                    player = %id,
                    ?field_id,
                    ?since,
                    "player document has half of a presence; treating as absent"
                );
                Presence::Absent
            }
        };

        let mut seen = HashSet::new();
        let friends = dedupe_into(&mut seen, self.friends.unwrap_or_default());
        let received = dedupe_into(&mut seen, self.friend_requests_received.unwrap_or_default());
        let sent = dedupe_into(&mut seen, self.friend_requests_sent.unwrap_or_default());

        let mut favorites = HashSet::new();
        let mut favorite_fields = self.favorite_fields.unwrap_or_default();
        favorite_fields.retain(|id| favorites.insert(*id));

        PlayerEntity {
            avatar: self
                .avatar
                .unwrap_or_else(|| format!("https://i.pravatar.cc/150?u={id}")),
            name: self.name.unwrap_or_else(|| "Player".to_string()),
            handle: self.handle.unwrap_or_else(|| "player".to_string()),
            email: self.email.unwrap_or_default(),
            join_date: self.join_date.unwrap_or(now),
            stats: self.stats.unwrap_or_default(),
            favorite_fields,
            friends,
            friend_requests_sent: sent,
            friend_requests_received: received,
            presence,
            rating: self.rating.unwrap_or(50),
            level: self.level.unwrap_or(1),
            experience: self.experience.unwrap_or(0),
            achievements: self.achievements.unwrap_or_default(),
            id,
        }
    }
}

impl From<&PlayerEntity> for PlayerRecord {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            name: Some(player.name.clone()),
            handle: Some(player.handle.clone()),
            email: Some(player.email.clone()),
            avatar: Some(player.avatar.clone()),
            join_date: Some(player.join_date),
            stats: Some(player.stats),
            favorite_fields: Some(player.favorite_fields.clone()),
            friends: Some(player.friends.clone()),
            friend_requests_sent: Some(player.friend_requests_sent.clone()),
            friend_requests_received: Some(player.friend_requests_received.clone()),
            current_field_id: player.presence.field_id(),
            check_in_time: player.presence.since(),
            rating: Some(player.rating),
            level: Some(player.level),
            experience: Some(player.experience),
            achievements: Some(player.achievements.clone()),
        }
    }
}

fn dedupe_into(seen: &mut HashSet<PlayerId>, ids: Vec<PlayerId>) -> Vec<PlayerId> {
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn unix_epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH
}

/// Stored timestamp: written as Unix milliseconds.
///
/// Reads integer or fractional milliseconds, numeric strings and RFC 3339 strings, which
/// is what older clients left behind.
pub struct LenientTimestamp;

impl SerializeAs<SystemTime> for LenientTimestamp {
    fn serialize_as<S>(source: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(to_millis(*source))
    }
}

impl<'de> DeserializeAs<'de, SystemTime> for LenientTimestamp {
    fn deserialize_as<D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimestamp {
            Millis(i64),
            Fractional(f64),
            Text(String),
        }

        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(millis) => Ok(from_millis(millis)),
            RawTimestamp::Fractional(millis) if millis.is_finite() => {
                Ok(from_millis(millis.round() as i64))
            }
            RawTimestamp::Fractional(millis) => {
                Err(D::Error::custom(format!("timestamp {millis} is not finite")))
            }
            RawTimestamp::Text(text) => parse_timestamp(&text)
                .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp `{text}`"))),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<SystemTime> {
    let text = text.trim();
    if let Ok(millis) = text.parse::<i64>() {
        return Some(from_millis(millis));
    }
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()
        .map(SystemTime::from)
}

/// Milliseconds since the Unix epoch; times before the epoch are negative.
pub fn to_millis(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Inverse of [`to_millis`].
pub fn from_millis(millis: i64) -> SystemTime {
    let magnitude = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        SystemTime::UNIX_EPOCH + magnitude
    } else {
        SystemTime::UNIX_EPOCH - magnitude
    }
}
