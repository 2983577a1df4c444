//! Process-wide event stream
//!
//! Only events without a session id go out here. Session events stay with
//! the observers of that session.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use super::{forward_events, join_first, spawn_receiver};
use crate::api::server::AppState;
use crate::models::SessionEvent;

pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_ws(socket, state))
}

async fn handle_events_ws(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();

    let events = process_events(state.service.router().subscribe_all());
    info!("Events WebSocket connected");

    let forward_task = tokio::spawn(forward_events(events, sender));
    join_first(forward_task, spawn_receiver(receiver)).await;

    info!("Events WebSocket disconnected");
}

/// Process-wide events from a broadcast receiver; overwritten events are skipped
fn process_events(
    rx: broadcast::Receiver<SessionEvent>,
) -> impl Stream<Item = SessionEvent> + Unpin + Send + 'static {
    BroadcastStream::new(rx).filter_map(|item| {
        let event = match item {
            Ok(event) if event.is_process_wide() => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("Events WebSocket lagged, missed {} events", n);
                None
            }
        };
        futures::future::ready(event)
    })
}
