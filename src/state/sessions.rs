use std::time::SystemTime;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::dao::models::PlayerId;

/// Client session opened by a signed-in player, owning its auto-checkout monitor.
///
/// Dropping the session (closing it, replacing it, or clearing the registry on shutdown)
/// cancels the monitor.
pub struct PlayerSession {
    /// Player the session belongs to.
    pub player_id: PlayerId,
    /// When the session was opened.
    pub opened_at: SystemTime,
    monitor: AbortHandle,
}

impl PlayerSession {
    /// Bind a monitor task to a player.
    pub fn new(player_id: PlayerId, opened_at: SystemTime, monitor: AbortHandle) -> Self {
        Self {
            player_id,
            opened_at,
            monitor,
        }
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

/// Open sessions, at most one per player.
///
/// `by_player` is always locked before `by_sid`, never the other way round.
#[derive(Default)]
pub struct SessionRegistry {
    by_sid: DashMap<Uuid, PlayerSession>,
    by_player: DashMap<PlayerId, Uuid>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `id`, returning the session it replaces for the same player.
    ///
    /// The player's slot stays locked for the whole swap, so concurrent opens for one player
    /// always leave exactly one session behind.
    pub fn open(&self, id: Uuid, session: PlayerSession) -> Option<PlayerSession> {
        match self.by_player.entry(session.player_id.clone()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(id);
                self.by_sid.insert(id, session);
                self.by_sid.remove(&previous).map(|(_, session)| session)
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
                self.by_sid.insert(id, session);
                None
            }
        }
    }

    /// Remove the session `id`.
    pub fn close(&self, id: Uuid) -> Option<PlayerSession> {
        let player_id = self.by_sid.get(&id)?.player_id.clone();
        self.by_player.remove_if(&player_id, |_, current| *current == id);
        self.by_sid.remove(&id).map(|(_, session)| session)
    }

    /// Session currently open for `player_id`.
    pub fn session_of(&self, player_id: &PlayerId) -> Option<Uuid> {
        self.by_player.get(player_id).map(|id| *id)
    }

    /// Whether `id` is open.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_sid.contains_key(id)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.by_sid.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.by_sid.is_empty()
    }

    /// Drop every session, cancelling their monitors.
    pub fn clear(&self) {
        self.by_player.clear();
        self.by_sid.clear();
    }
}
