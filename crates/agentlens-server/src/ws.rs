//! WebSocket endpoint.
//!
//! Flow:
//! 1. Browser connects to `/ws`; the hub assigns a client id.
//! 2. Client sends `subscribe` with a session id; the hub attaches it to
//!    that session's shared watcher.
//! 3. The hub pushes `messages`, `error` and `session:*` frames through a
//!    bounded per-client channel; a writer task owns the sink.
//! 4. On disconnect the hub detaches the client and stops the watcher if it
//!    was the last subscriber.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::hub::{CloseReason, OUTBOUND_BUFFER, SessionHub};

/// GET /ws: upgrade to WebSocket.
pub async fn session_ws(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<SessionHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<SessionHub>) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let close_reason: CloseReason = Arc::new(Mutex::new(None));

    let client_id = hub.register_client(outbound_tx, close_reason.clone());

    // Writer task: forwards hub frames to the sink, then performs the close
    // handshake with whatever reason the hub recorded.
    let writer_reason = close_reason.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let (code, reason) = (*writer_reason.lock()).unwrap_or((1000, ""));
        let _ = ws_sink
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => hub.handle_frame(client_id, &text).await,
            Message::Binary(_) => {
                // Text-only protocol.
                *close_reason.lock() = Some((1003, "binary frames not supported"));
                break;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {
                // axum answers WS-level pings itself.
            }
        }
    }

    // Dropping the registered sender ends the writer, which then closes the
    // socket with the recorded reason.
    hub.disconnect(client_id);
    let _ = writer.await;
}
