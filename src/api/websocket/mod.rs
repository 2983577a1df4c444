//! WebSocket handlers
//!
//! Events are written to the socket one at a time and each send is awaited,
//! so a slow client slows its own forwarder down instead of losing events.

pub mod events;
pub mod sessions;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::models::SessionEvent;

/// Write every event from `events` to `sink` as a JSON text frame
///
/// Returns when the stream ends or the sink rejects a frame.
async fn forward_events<St, Si>(mut events: St, mut sink: Si)
where
    St: Stream<Item = SessionEvent> + Unpin,
    Si: Sink<Message> + Unpin,
{
    while let Some(event) = events.next().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize session event: {}", e);
                continue;
            }
        };

        if sink.send(Message::Text(json)).await.is_err() {
            debug!("WebSocket sink closed");
            break;
        }
    }
}

/// Read until the client closes; pings are answered by axum
fn spawn_receiver(mut receiver: SplitStream<WebSocket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket received close");
                    break;
                }
                Err(e) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    })
}

/// Wait for either task to end, then stop the other
async fn join_first(mut forward: JoinHandle<()>, mut receive: JoinHandle<()>) {
    tokio::select! {
        _ = &mut forward => debug!("Forward task ended"),
        _ = &mut receive => debug!("Receive task ended"),
    }

    forward.abort();
    receive.abort();
}
