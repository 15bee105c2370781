//! Check-in and check-out.
//!
//! Every transition runs as one transaction that reads the player and every field involved
//! before writing anything, so a switch between fields is a single leave-and-join and a
//! player is never listed on two fields at once.

use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::{
    dao::{
        field_store::{DocKey, Versioned},
        models::{FieldEntity, FieldId, PlayerEntity, PlayerId},
    },
    error::ServiceError,
    services::{
        sse_events,
        transaction::{Transaction, run_transaction},
    },
    state::{
        SharedState,
        presence::{CheckInPlan, Presence, credits_visit},
    },
};

/// Confirmed result of a check-in.
#[derive(Debug, Clone)]
pub struct CheckInOutcome {
    /// Player after the transition.
    pub player: PlayerEntity,
    /// Field joined.
    pub field: FieldEntity,
    /// Field left by a switch.
    pub left: Option<FieldEntity>,
    /// False when the player was already there and nothing was written.
    pub changed: bool,
    /// Documents the player pointed at that no longer exist.
    pub stale_references: Vec<DocKey>,
    confirmed: Vec<Versioned<FieldEntity>>,
}

/// Confirmed result of a check-out.
#[derive(Debug, Clone)]
pub struct CheckOutOutcome {
    /// Player after the transition.
    pub player: PlayerEntity,
    /// Field named by the request, if it still exists.
    pub field: Option<FieldEntity>,
    /// Recorded current field when it differed from the requested one.
    pub also_left: Option<FieldEntity>,
    /// Whether the session counted as a visit.
    pub visit_credited: bool,
    /// Session length, when the player was checked in.
    pub duration: Option<Duration>,
    /// Documents that no longer exist.
    pub stale_references: Vec<DocKey>,
    confirmed: Vec<Versioned<FieldEntity>>,
}

/// Check `player_id` into `field_id`, leaving the current field in the same transaction.
///
/// Checking into the current field is a no-op. A missing target field fails with
/// [`ServiceError::FieldUnavailable`] without writing anything; a missing field being left is
/// reported as a stale reference and does not block the switch.
pub async fn check_in(
    state: &SharedState,
    player_id: PlayerId,
    field_id: FieldId,
) -> Result<CheckInOutcome, ServiceError> {
    let store = state.require_field_store().await?;
    let now = state.clock().now();

    let outcome = run_transaction(&store, |tx| {
        let player_id = player_id.clone();
        Box::pin(async move { plan_check_in(tx, player_id, field_id, now).await })
    })
    .await?;

    if outcome.changed {
        info!(
            player_id = %player_id,
            field_id = %field_id,
            left = ?outcome.left.as_ref().map(|field| field.id),
            "player checked in"
        );
        state
            .catalog()
            .write()
            .await
            .merge_confirmed(outcome.confirmed.iter().cloned());
        sse_events::broadcast_field_updated(state, &outcome.field);
        if let Some(left) = &outcome.left {
            sse_events::broadcast_field_updated(state, left);
        }
        sse_events::broadcast_player_updated(state, &outcome.player);
    } else {
        state
            .catalog()
            .write()
            .await
            .merge_confirmed(outcome.confirmed.iter().cloned());
    }

    Ok(outcome)
}

async fn plan_check_in(
    tx: &mut Transaction,
    player_id: PlayerId,
    field_id: FieldId,
    now: SystemTime,
) -> Result<CheckInOutcome, ServiceError> {
    let mut player = tx
        .get_player(&player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;
    let plan = CheckInPlan::compute(&player.presence, field_id);

    let target = tx.get_field(field_id).await?;
    let leaving = match plan.leaving() {
        Some(from) => Some((from, tx.get_field(from).await?)),
        None => None,
    };
    let mut target = target.ok_or(ServiceError::FieldUnavailable(field_id))?;

    if plan == CheckInPlan::AlreadyThere {
        return Ok(CheckInOutcome {
            confirmed: vec![tx.committed_field(target.clone())],
            player,
            field: target,
            left: None,
            changed: false,
            stale_references: Vec::new(),
        });
    }

    let mut stale_references = Vec::new();
    let mut left = None;
    if let Some((from, old)) = leaving {
        match old {
            Some(mut old) => {
                if old.remove_player(&player_id) {
                    tx.put_field(old.clone());
                }
                left = Some(old);
            }
            None => {
                warn!(
                    player_id = %player_id,
                    field_id = %from,
                    "field being left no longer exists"
                );
                stale_references.push(DocKey::Field(from));
            }
        }
    }

    target.upsert_player(player.as_field_player(now));
    tx.put_field(target.clone());

    player.presence = Presence::Present {
        field_id,
        since: now,
    };
    tx.put_player(player.clone());

    let confirmed = std::iter::once(&target)
        .chain(left.as_ref())
        .map(|field| tx.committed_field(field.clone()))
        .collect();
    Ok(CheckInOutcome {
        player,
        field: target,
        left,
        changed: true,
        stale_references,
        confirmed,
    })
}

/// Check `player_id` out of `field_id`.
///
/// The player is removed from the named field and, when it differs, from the recorded current
/// field too. Missing fields are tolerated so the player can always return to absent. A
/// session of at least the configured dwell time credits one visit.
pub async fn check_out(
    state: &SharedState,
    player_id: PlayerId,
    field_id: FieldId,
) -> Result<CheckOutOutcome, ServiceError> {
    let store = state.require_field_store().await?;
    let now = state.clock().now();
    let dwell = state.config().presence.visit_dwell;

    let outcome = run_transaction(&store, |tx| {
        let player_id = player_id.clone();
        Box::pin(async move { plan_check_out(tx, player_id, field_id, now, dwell).await })
    })
    .await?;

    info!(
        player_id = %player_id,
        field_id = %field_id,
        visit_credited = outcome.visit_credited,
        duration_secs = outcome.duration.map(|d| d.as_secs()),
        "player checked out"
    );
    state
        .catalog()
        .write()
        .await
        .merge_confirmed(outcome.confirmed.iter().cloned());
    for field in outcome.field.iter().chain(outcome.also_left.iter()) {
        sse_events::broadcast_field_updated(state, field);
    }
    sse_events::broadcast_player_updated(state, &outcome.player);

    Ok(outcome)
}

async fn plan_check_out(
    tx: &mut Transaction,
    player_id: PlayerId,
    field_id: FieldId,
    now: SystemTime,
    dwell: Duration,
) -> Result<CheckOutOutcome, ServiceError> {
    let mut player = tx
        .get_player(&player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;

    let field = tx.get_field(field_id).await?;
    let recorded = player.presence.field_id().filter(|id| *id != field_id);
    let other = match recorded {
        Some(id) => Some((id, tx.get_field(id).await?)),
        None => None,
    };

    let mut stale_references = Vec::new();
    let field = leave_field(tx, &player_id, field_id, field, &mut stale_references);
    let also_left = other
        .and_then(|(id, other)| leave_field(tx, &player_id, id, other, &mut stale_references));

    let duration = player.presence.elapsed(now);
    let visit_credited = player
        .presence
        .since()
        .is_some_and(|since| credits_visit(since, now, dwell));
    if visit_credited {
        player.stats.fields_visited += 1;
    }
    if player.presence != Presence::Absent {
        player.presence = Presence::Absent;
        tx.put_player(player.clone());
    }

    let confirmed = field
        .iter()
        .chain(also_left.iter())
        .map(|field| tx.committed_field(field.clone()))
        .collect();
    Ok(CheckOutOutcome {
        player,
        field,
        also_left,
        visit_credited,
        duration,
        stale_references,
        confirmed,
    })
}

fn leave_field(
    tx: &mut Transaction,
    player_id: &PlayerId,
    field_id: FieldId,
    field: Option<FieldEntity>,
    stale_references: &mut Vec<DocKey>,
) -> Option<FieldEntity> {
    match field {
        Some(mut field) => {
            if field.remove_player(player_id) {
                tx.put_field(field.clone());
            }
            Some(field)
        }
        None => {
            warn!(
                player_id = %player_id,
                field_id = %field_id,
                "checking out of a field that no longer exists"
            );
            stale_references.push(DocKey::Field(field_id));
            None
        }
    }
}
