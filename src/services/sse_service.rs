//! Public update stream.
//!
//! Each client gets a `system.status` snapshot first, then every storage-confirmed field and
//! player change. A client that falls behind the broadcast buffer is told how many updates it
//! missed through `stream.lagged` and keeps streaming; it should refetch what it displays.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, warn};

use crate::{
    dto::sse::ServerEvent,
    services::sse_events,
    state::SharedState,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
/// Events buffered per client between the forwarder and the HTTP response.
const CLIENT_BUFFER: usize = 16;

/// Receiver for one client, primed with the status snapshot it must see first.
pub struct UpdateSubscription {
    snapshot: Option<ServerEvent>,
    receiver: broadcast::Receiver<ServerEvent>,
}

impl UpdateSubscription {
    /// Wrap `receiver`, sending `snapshot` before any broadcast update.
    pub fn new(snapshot: Option<ServerEvent>, receiver: broadcast::Receiver<ServerEvent>) -> Self {
        Self { snapshot, receiver }
    }
}

/// Subscribe a new client to field and player updates.
pub fn subscribe_updates(state: &SharedState) -> UpdateSubscription {
    // Subscribe before taking the snapshot so a status flip in between is not lost.
    let receiver = state.public_sse().subscribe();
    UpdateSubscription::new(sse_events::system_status(state.is_degraded()), receiver)
}

/// Serve `subscription` as an SSE response until the client disconnects.
pub fn into_sse(
    subscription: UpdateSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    tokio::spawn(forward_updates(subscription, tx));

    let stream = ReceiverStream::new(rx).map(|update| Ok(to_sse_event(update)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Copy updates from the broadcast hub into one client's buffer.
///
/// Returns when the client goes away or the hub shuts down.
pub async fn forward_updates(subscription: UpdateSubscription, tx: mpsc::Sender<ServerEvent>) {
    let UpdateSubscription {
        snapshot,
        mut receiver,
    } = subscription;
    if let Some(snapshot) = snapshot {
        if tx.send(snapshot).await.is_err() {
            return;
        }
    }

    loop {
        let update = tokio::select! {
            _ = tx.closed() => break,
            received = receiver.recv() => received,
        };
        let event = match update {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "update stream client lagged");
                match sse_events::stream_lagged(missed) {
                    Some(notice) => notice,
                    None => continue,
                }
            }
            Err(RecvError::Closed) => break,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }

    debug!("update stream client disconnected");
}

fn to_sse_event(update: ServerEvent) -> Event {
    let event = Event::default().data(update.data);
    match update.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::state::SseHub;

    fn update(name: &str) -> ServerEvent {
        ServerEvent::new(Some(name.to_string()), "{}".to_string())
    }

    #[tokio::test]
    async fn snapshot_comes_first_and_lag_is_reported() {
        let hub = SseHub::new(2);
        let subscription = UpdateSubscription::new(sse_events::system_status(true), hub.subscribe());
        for name in ["field.updated", "player.updated", "field.updated"] {
            hub.broadcast(update(name));
        }

        let (tx, mut rx) = mpsc::channel(8);
        let forwarder = tokio::spawn(forward_updates(subscription, tx));

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.event.as_deref(), Some("system.status"));
        let status: Value = serde_json::from_str(&snapshot.data).unwrap();
        assert_eq!(status["degraded"], true);

        let lagged = rx.recv().await.unwrap();
        assert_eq!(lagged.event.as_deref(), Some("stream.lagged"));
        let lagged: Value = serde_json::from_str(&lagged.data).unwrap();
        assert_eq!(lagged["missed"], 1);

        assert_eq!(rx.recv().await.unwrap().event.as_deref(), Some("player.updated"));
        assert_eq!(rx.recv().await.unwrap().event.as_deref(), Some("field.updated"));

        drop(rx);
        hub.broadcast(update("field.updated"));
        forwarder.await.unwrap();
    }

    #[tokio::test]
    async fn forwarder_stops_when_the_hub_closes() {
        let hub = SseHub::new(4);
        let subscription = UpdateSubscription::new(None, hub.subscribe());
        let (tx, mut rx) = mpsc::channel(8);
        let forwarder = tokio::spawn(forward_updates(subscription, tx));

        hub.broadcast(update("field.updated"));
        assert_eq!(rx.recv().await.unwrap().event.as_deref(), Some("field.updated"));
        drop(hub);

        forwarder.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
