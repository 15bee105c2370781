//! Friend graph.
//!
//! A pair of players is in exactly one relation at a time: friends, one pending request in
//! either direction, or nothing. Every change touches both players in one transaction.

use tracing::info;

use crate::{
    dao::models::{FriendRelation, PlayerEntity, PlayerId},
    error::ServiceError,
    services::{chunked_lookup::players_by_ids, sse_events, transaction::run_transaction},
    state::SharedState,
};

/// Operation applied to a pair of players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendAction {
    /// Ask to become friends; accepts a pending request from the other player.
    Request,
    /// Accept a pending request from the other player.
    Accept,
    /// Decline a pending request from the other player.
    Decline,
    /// Drop the friendship and any pending request between the two.
    Remove,
}

/// Apply `action` from `player_id` towards `other_id` and return the resulting relation.
pub async fn apply(
    state: &SharedState,
    player_id: PlayerId,
    other_id: PlayerId,
    action: FriendAction,
) -> Result<FriendRelation, ServiceError> {
    if player_id == other_id {
        return Err(ServiceError::InvalidInput(
            "players cannot befriend themselves".into(),
        ));
    }
    let store = state.require_field_store().await?;

    let (me, other, changed) = run_transaction(&store, |tx| {
        let player_id = player_id.clone();
        let other_id = other_id.clone();
        Box::pin(async move {
            let mut me = tx
                .get_player(&player_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;
            let mut other = tx
                .get_player(&other_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("player {other_id}")))?;

            let changed = transition(&mut me, &mut other, action)?;
            if changed {
                tx.put_player(me.clone());
                tx.put_player(other.clone());
            }
            Ok((me, other, changed))
        })
    })
    .await?;

    let relation = me.relation_to(&other.id);
    if changed {
        info!(
            player_id = %me.id,
            other_id = %other.id,
            ?action,
            ?relation,
            "friend graph updated"
        );
        sse_events::broadcast_player_updated(state, &me);
        sse_events::broadcast_player_updated(state, &other);
    }
    Ok(relation)
}

/// Apply `action` to both sides. Returns whether anything changed.
fn transition(
    me: &mut PlayerEntity,
    other: &mut PlayerEntity,
    action: FriendAction,
) -> Result<bool, ServiceError> {
    let relation = me.relation_to(&other.id);
    match (action, relation) {
        (FriendAction::Request, FriendRelation::Friends | FriendRelation::RequestSent) => {
            Ok(false)
        }
        (FriendAction::Request, FriendRelation::RequestReceived)
        | (FriendAction::Accept, FriendRelation::RequestReceived) => {
            me.forget(&other.id);
            other.forget(&me.id);
            me.friends.push(other.id.clone());
            other.friends.push(me.id.clone());
            Ok(true)
        }
        (FriendAction::Request, FriendRelation::None) => {
            me.forget(&other.id);
            other.forget(&me.id);
            me.friend_requests_sent.push(other.id.clone());
            other.friend_requests_received.push(me.id.clone());
            Ok(true)
        }
        (FriendAction::Decline, FriendRelation::RequestReceived) => {
            me.forget(&other.id);
            other.forget(&me.id);
            Ok(true)
        }
        (FriendAction::Accept | FriendAction::Decline, _) => Err(ServiceError::InvalidState(
            format!("no pending request from {}", other.id),
        )),
        (FriendAction::Remove, FriendRelation::None) => {
            // Heal a one-sided link left by legacy data.
            let dangling = other.relation_to(&me.id) != FriendRelation::None;
            other.forget(&me.id);
            Ok(dangling)
        }
        (FriendAction::Remove, _) => {
            me.forget(&other.id);
            other.forget(&me.id);
            Ok(true)
        }
    }
}

/// Confirmed friends of `player_id`.
pub async fn friends(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<Vec<PlayerEntity>, ServiceError> {
    let player = load_player(state, &player_id).await?;
    hydrate(state, player.friends).await
}

/// Players with a pending request to `player_id`.
pub async fn friend_requests(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<Vec<PlayerEntity>, ServiceError> {
    let player = load_player(state, &player_id).await?;
    hydrate(state, player.friend_requests_received).await
}

async fn load_player(
    state: &SharedState,
    player_id: &PlayerId,
) -> Result<PlayerEntity, ServiceError> {
    let store = state.require_field_store().await?;
    store
        .find_player(player_id.clone())
        .await?
        .map(|doc| doc.value)
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))
}

async fn hydrate(
    state: &SharedState,
    ids: Vec<PlayerId>,
) -> Result<Vec<PlayerEntity>, ServiceError> {
    let store = state.require_field_store().await?;
    Ok(players_by_ids(store.as_ref(), ids, state.config().lookup_chunk_size).await?)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn pair() -> (PlayerEntity, PlayerEntity) {
        (
            PlayerEntity::new(PlayerId::from("a"), SystemTime::UNIX_EPOCH),
            PlayerEntity::new(PlayerId::from("b"), SystemTime::UNIX_EPOCH),
        )
    }

    fn exclusive(player: &PlayerEntity) -> bool {
        player.friends.iter().all(|id| {
            !player.friend_requests_sent.contains(id)
                && !player.friend_requests_received.contains(id)
        }) && player
            .friend_requests_sent
            .iter()
            .all(|id| !player.friend_requests_received.contains(id))
    }

    #[test]
    fn request_then_accept_makes_friends() {
        let (mut a, mut b) = pair();
        assert!(transition(&mut a, &mut b, FriendAction::Request).unwrap());
        assert_eq!(a.relation_to(&b.id), FriendRelation::RequestSent);
        assert_eq!(b.relation_to(&a.id), FriendRelation::RequestReceived);

        assert!(transition(&mut b, &mut a, FriendAction::Accept).unwrap());
        assert_eq!(a.relation_to(&b.id), FriendRelation::Friends);
        assert_eq!(b.relation_to(&a.id), FriendRelation::Friends);
        assert!(exclusive(&a) && exclusive(&b));
    }

    #[test]
    fn crossing_requests_accept() {
        let (mut a, mut b) = pair();
        transition(&mut a, &mut b, FriendAction::Request).unwrap();
        assert!(transition(&mut b, &mut a, FriendAction::Request).unwrap());
        assert_eq!(a.relation_to(&b.id), FriendRelation::Friends);
        assert!(exclusive(&a) && exclusive(&b));
    }

    #[test]
    fn repeated_request_is_a_no_op() {
        let (mut a, mut b) = pair();
        transition(&mut a, &mut b, FriendAction::Request).unwrap();
        assert!(!transition(&mut a, &mut b, FriendAction::Request).unwrap());
        assert_eq!(a.friend_requests_sent.len(), 1);
    }

    #[test]
    fn accept_without_request_is_rejected() {
        let (mut a, mut b) = pair();
        let err = transition(&mut a, &mut b, FriendAction::Accept).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn decline_and_remove_clear_both_sides() {
        let (mut a, mut b) = pair();
        transition(&mut a, &mut b, FriendAction::Request).unwrap();
        assert!(transition(&mut b, &mut a, FriendAction::Decline).unwrap());
        assert_eq!(a.relation_to(&b.id), FriendRelation::None);
        assert_eq!(b.relation_to(&a.id), FriendRelation::None);

        transition(&mut a, &mut b, FriendAction::Request).unwrap();
        transition(&mut b, &mut a, FriendAction::Accept).unwrap();
        assert!(transition(&mut a, &mut b, FriendAction::Remove).unwrap());
        assert!(a.friends.is_empty() && b.friends.is_empty());
    }
}
