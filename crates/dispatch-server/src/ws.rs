//! `WebSocket` session channel.
//!
//! Clients connect to `GET /ws`. Every session gets its own broadcaster
//! subscription and is sent a [`ServerMessage::Snapshot`] right away. The
//! subscription is taken before the snapshot so nothing published in
//! between is missed. After that the server forwards each broadcast as an
//! `event` or `catalogInvalidated` frame.
//!
//! A session that falls too far behind is evicted by the broadcaster. The
//! handler then resubscribes and sends `resyncRequired`; the client is
//! expected to discard its mirror and send `{"type":"resync"}`.
//!
//! Clients may also send `{"type":"statuses","departmentId":...}` to
//! fetch a department's catalog after a `catalogInvalidated` frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use dispatch_types::{ClientMessage, ServerMessage};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_sync(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Drive one session until the client leaves.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.broadcaster.subscribe();
    debug!(subscription = %subscription.id(), "WebSocket session connected");

    if send(&mut socket, &snapshot(&state).await).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            broadcast = subscription.recv() => {
                let Some(message) = broadcast else {
                    info!(subscription = %subscription.id(), "WebSocket session evicted, resubscribing");
                    subscription = state.broadcaster.subscribe();
                    if send(&mut socket, &ServerMessage::ResyncRequired).await.is_err() {
                        return;
                    }
                    continue;
                };
                if send(&mut socket, &ServerMessage::from(message)).await.is_err() {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            incoming = socket.recv() => {
                let reply = match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscription = %subscription.id(), "WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    Some(Ok(Message::Text(text))) => handle_client_frame(&state, text.as_str()).await,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    Some(Ok(_)) => continue,
                };
                if send(&mut socket, &reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Answer one client frame.
async fn handle_client_frame(state: &AppState, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Resync) => snapshot(state).await,
        Ok(ClientMessage::Statuses { department_id }) => ServerMessage::Statuses {
            department_id,
            statuses: state.view.list_statuses(department_id).await,
        },
        Err(e) => ServerMessage::Error {
            message: format!("unrecognized frame: {e}"),
        },
    }
}

async fn snapshot(state: &AppState) -> ServerMessage {
    ServerMessage::Snapshot {
        snapshot: Box::new(state.view.snapshot().await),
    }
}

async fn send(socket: &mut WebSocket, frame: &ServerMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize server frame: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}
