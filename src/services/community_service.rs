//! Reviews, chat pointers and favorites.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{ChatPointerEntity, FieldEntity, FieldId, PlayerEntity, PlayerId, ReviewEntity},
    error::ServiceError,
    services::{chunked_lookup::fields_by_ids, sse_events, transaction::run_transaction},
    state::SharedState,
};

/// Review text and rating.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    /// Stars, 1 to 5.
    pub rating: u8,
    /// Free text.
    pub comment: String,
}

/// Message that becomes a field's chat pointer.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Id of the message in the chat service.
    pub message_id: String,
    /// Message text.
    pub text: String,
}

/// Review `field_id` as `author`. A second review by the same author replaces the first.
///
/// Returns the field with its recomputed rating.
pub async fn review_field(
    state: &SharedState,
    field_id: FieldId,
    author: PlayerId,
    review: ReviewDraft,
) -> Result<FieldEntity, ServiceError> {
    if !(1..=5).contains(&review.rating) {
        return Err(ServiceError::InvalidInput(format!(
            "rating must be between 1 and 5 (got {})",
            review.rating
        )));
    }

    let store = state.require_field_store().await?;
    let now = state.clock().now();

    let (field, player) = run_transaction(&store, |tx| {
        let author = author.clone();
        let review = review.clone();
        Box::pin(async move {
            let mut field = tx
                .get_field(field_id)
                .await?
                .ok_or(ServiceError::FieldUnavailable(field_id))?;
            let mut player = tx
                .get_player(&author)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("player {author}")))?;

            match field.reviews.iter_mut().find(|r| r.author_id == author) {
                Some(existing) => {
                    existing.rating = review.rating;
                    existing.comment = review.comment;
                    existing.author_name = player.name.clone();
                    existing.author_avatar = player.avatar.clone();
                    existing.created_at = now;
                }
                None => {
                    field.reviews.push(ReviewEntity {
                        id: Uuid::new_v4().to_string(),
                        author_id: author.clone(),
                        author_name: player.name.clone(),
                        author_avatar: player.avatar.clone(),
                        rating: review.rating,
                        comment: review.comment,
                        created_at: now,
                    });
                    player.stats.reviews_left += 1;
                    tx.put_player(player.clone());
                }
            }
            field.refresh_rating();
            tx.put_field(field.clone());
            Ok((tx.committed_field(field), player))
        })
    })
    .await?;

    info!(field_id = %field_id, author = %author, rating = field.value.rating, "review saved");
    state.catalog().write().await.merge_confirmed([field.clone()]);
    sse_events::broadcast_field_updated(state, &field.value);
    sse_events::broadcast_player_updated(state, &player);
    Ok(field.value)
}

/// Point the chat of `field_id` at a new last message.
pub async fn post_chat_pointer(
    state: &SharedState,
    field_id: FieldId,
    author: PlayerId,
    message: ChatMessage,
) -> Result<FieldEntity, ServiceError> {
    let store = state.require_field_store().await?;
    let now = state.clock().now();

    let field = run_transaction(&store, |tx| {
        let author = author.clone();
        let message = message.clone();
        Box::pin(async move {
            let mut field = tx
                .get_field(field_id)
                .await?
                .ok_or(ServiceError::FieldUnavailable(field_id))?;
            let player = tx
                .get_player(&author)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("player {author}")))?;

            field.last_message = Some(ChatPointerEntity {
                message_id: message.message_id,
                author_id: author,
                author_name: player.name,
                text: message.text,
                sent_at: now,
            });
            tx.put_field(field.clone());
            Ok(tx.committed_field(field))
        })
    })
    .await?;

    state.catalog().write().await.merge_confirmed([field.clone()]);
    sse_events::broadcast_field_updated(state, &field.value);
    Ok(field.value)
}

/// Add `field_id` to the favorites of `player_id`, or remove it if present.
///
/// Returns the player and whether the field is a favorite afterwards.
pub async fn toggle_favorite(
    state: &SharedState,
    player_id: PlayerId,
    field_id: FieldId,
) -> Result<(PlayerEntity, bool), ServiceError> {
    let store = state.require_field_store().await?;

    let (player, favorite) = run_transaction(&store, |tx| {
        let player_id = player_id.clone();
        Box::pin(async move {
            let mut player = tx
                .get_player(&player_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;

            let favorite = if player.favorite_fields.contains(&field_id) {
                player.favorite_fields.retain(|id| *id != field_id);
                false
            } else {
                tx.get_field(field_id)
                    .await?
                    .ok_or(ServiceError::FieldUnavailable(field_id))?;
                player.favorite_fields.push(field_id);
                true
            };
            tx.put_player(player.clone());
            Ok((player, favorite))
        })
    })
    .await?;

    sse_events::broadcast_player_updated(state, &player);
    Ok((player, favorite))
}

/// Favorite fields of `player_id`, refreshed into the catalog.
pub async fn favorites(
    state: &SharedState,
    player_id: PlayerId,
) -> Result<Vec<FieldEntity>, ServiceError> {
    let store = state.require_field_store().await?;
    let player = store
        .find_player(player_id.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?
        .value;

    let fields = fields_by_ids(
        store.as_ref(),
        player.favorite_fields,
        state.config().lookup_chunk_size,
    )
    .await?;
    state
        .catalog()
        .write()
        .await
        .merge_confirmed(fields.iter().cloned());
    Ok(fields.into_iter().map(|field| field.value).collect())
}
