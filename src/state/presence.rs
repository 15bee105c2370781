use std::time::{Duration, SystemTime};

use crate::dao::models::FieldId;

/// Where a player currently is.
///
/// A player is either nowhere or checked into exactly one field, with the time of check-in.
/// Persisted documents flatten this into the nullable `current_field_id` / `check_in_time`
/// pair; keeping it as one enum in memory means the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Not checked into any field.
    #[default]
    Absent,
    /// Checked into `field_id` since `since`.
    Present {
        /// Field the player occupies.
        field_id: FieldId,
        /// Check-in time.
        since: SystemTime,
    },
}

impl Presence {
    /// Field currently occupied, if any.
    pub fn field_id(&self) -> Option<FieldId> {
        match self {
            Presence::Absent => None,
            Presence::Present { field_id, .. } => Some(*field_id),
        }
    }

    /// Check-in time, if present.
    pub fn since(&self) -> Option<SystemTime> {
        match self {
            Presence::Absent => None,
            Presence::Present { since, .. } => Some(*since),
        }
    }

    /// Whether the player is checked into `field_id`.
    pub fn is_at(&self, field_id: FieldId) -> bool {
        self.field_id() == Some(field_id)
    }

    /// Time spent at the current field as of `now`. Clock skew yields zero.
    pub fn elapsed(&self, now: SystemTime) -> Option<Duration> {
        self.since()
            .map(|since| now.duration_since(since).unwrap_or_default())
    }

    /// Whether the presence has outlived `ttl` as of `now`.
    pub fn is_expired(&self, now: SystemTime, ttl: Duration) -> bool {
        self.elapsed(now).is_some_and(|elapsed| elapsed > ttl)
    }
}

/// Outcome of planning a check-in against the player's confirmed presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInPlan {
    /// Already present at the target; nothing to write.
    AlreadyThere,
    /// Absent player joins the target.
    Join {
        /// Field being joined.
        to: FieldId,
    },
    /// Present player leaves `from` and joins `to` in the same transaction.
    Switch {
        /// Field being left.
        from: FieldId,
        /// Field being joined.
        to: FieldId,
    },
}

impl CheckInPlan {
    /// Compute the transition for checking into `target` from `current`.
    pub fn compute(current: &Presence, target: FieldId) -> Self {
        match current.field_id() {
            Some(from) if from == target => CheckInPlan::AlreadyThere,
            Some(from) => CheckInPlan::Switch { from, to: target },
            None => CheckInPlan::Join { to: target },
        }
    }

    /// Field that must be read and cleaned up before joining, if any.
    pub fn leaving(&self) -> Option<FieldId> {
        match self {
            CheckInPlan::Switch { from, .. } => Some(*from),
            _ => None,
        }
    }
}

/// Whether a session that started at `since` and ends at `now` counts as a visit.
///
/// Sessions shorter than `dwell` never count, so rapid check-in/check-out cycles cannot farm
/// the visit counter.
pub fn credits_visit(since: SystemTime, now: SystemTime, dwell: Duration) -> bool {
    now.duration_since(since)
        .map(|elapsed| elapsed >= dwell)
        .unwrap_or(false)
}
