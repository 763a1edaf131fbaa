//! WebSocket push channel
//!
//! Each connected page receives the current update session and backend
//! handle, then every subsequent transition. A connected page also counts as
//! an open window for as long as the socket stays up.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use shared::{process_debug, process_warn, BackendProcessHandle, ProcessId, UpdateSession};

use super::BridgeState;

/// Server-to-page messages
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum PushMessage {
    UpdateStatus(UpdateSession),
    BackendStatus(BackendProcessHandle),
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: BridgeState) {
    let _page = state.pages.connect();
    let (mut sender, mut receiver) = socket.split();

    let (session, _subscription, mut updates) = state.updater.snapshot_and_subscribe().await;
    let mut backend = state.context.backend_watch();

    let handle = backend.borrow_and_update().clone();
    for message in [PushMessage::UpdateStatus(session), PushMessage::BackendStatus(handle)] {
        if send(&mut sender, &message).await.is_err() {
            return;
        }
    }

    loop {
        let message = tokio::select! {
            Some(session) = updates.recv() => PushMessage::UpdateStatus(session),
            Ok(()) = backend.changed() => {
                let handle = backend.borrow_and_update().clone();
                PushMessage::BackendStatus(handle)
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Text(text))) => {
                    process_debug!(ProcessId::current(), "📨 Page says: {}", text);
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    process_warn!(ProcessId::current(), "WebSocket error: {}", e);
                    break;
                }
            },
        };

        if send(&mut sender, &message).await.is_err() {
            break;
        }
    }

    process_debug!(ProcessId::current(), "🔌 Page disconnected");
}

async fn send<S>(sender: &mut S, message: &PushMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| {
        process_warn!(ProcessId::current(), "Failed to serialize push message: {}", e);
    })?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
