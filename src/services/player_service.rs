use tracing::info;

use crate::{
    dao::models::{PlayerEntity, PlayerId},
    error::ServiceError,
    services::{sse_events, transaction::run_transaction},
    state::SharedState,
};

/// Profile attributes to set; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// Display name.
    pub name: Option<String>,
    /// Handle.
    pub handle: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
}

/// Create the player with default attributes if absent, then apply `update`.
pub async fn upsert_player(
    state: &SharedState,
    player_id: PlayerId,
    update: ProfileUpdate,
) -> Result<PlayerEntity, ServiceError> {
    let store = state.require_field_store().await?;
    let now = state.clock().now();

    let (player, created) = run_transaction(&store, |tx| {
        let player_id = player_id.clone();
        let update = update.clone();
        Box::pin(async move {
            let existing = tx.get_player(&player_id).await?;
            let created = existing.is_none();
            let mut player = existing.unwrap_or_else(|| PlayerEntity::new(player_id, now));

            if let Some(name) = update.name {
                player.name = name.trim().to_string();
            }
            if let Some(handle) = update.handle {
                player.handle = handle.trim().to_string();
            }
            if let Some(email) = update.email {
                player.email = email;
            }
            if let Some(avatar) = update.avatar {
                player.avatar = avatar;
            }
            tx.put_player(player.clone());
            Ok((player, created))
        })
    })
    .await?;

    info!(player_id = %player.id, created, "player profile saved");
    sse_events::broadcast_player_updated(state, &player);
    Ok(player)
}

/// Read one player.
pub async fn get_player(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<PlayerEntity, ServiceError> {
    let store = state.require_field_store().await?;
    store
        .find_player(player_id.clone())
        .await?
        .map(|doc| doc.value)
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))
}
