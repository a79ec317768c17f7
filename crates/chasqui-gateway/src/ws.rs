use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::state::SharedState;

/// WebSocket upgrade handler for real-time subscribers.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forwards every bus event to the subscriber as one JSON frame. Delivery is
/// at-most-once: a subscriber that falls behind or disconnects misses events
/// and catches up through the REST API.
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut events = state.events.subscribe();
    info!("new WebSocket subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    let welcome = serde_json::json!({ "type": "connected" });
    if sender
        .send(Message::Text(welcome.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("failed to serialize event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("subscriber lagged, {missed} event(s) dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket error: {e}");
                    break;
                }
                _ => {}
            },
        }
    }

    info!("WebSocket subscriber disconnected");
}
