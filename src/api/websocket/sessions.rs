//! Per-session event stream
//!
//! The connection only ever sees events stamped with its own session id.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::info;

use super::{forward_events, join_first, spawn_receiver};
use crate::api::server::AppState;
use crate::models::SessionId;

pub async fn session_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_ws(socket, state, SessionId::new(session_id)))
}

async fn handle_session_ws(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (sender, receiver) = socket.split();

    // No backlog: only events published from here on are delivered.
    let subscription = state.service.subscribe(session_id.clone());
    info!(session_id = %session_id, "Session WebSocket connected");

    let forward_task = tokio::spawn(forward_events(subscription, sender));
    join_first(forward_task, spawn_receiver(receiver)).await;

    info!(session_id = %session_id, "Session WebSocket disconnected");
}
