use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::application::ControlHandler;
use crate::domain::ConnectionId;
use crate::infrastructure::ConnectionSendQueues;

use super::tracker::{ConnectionGuard, ConnectionTracker};

/// WebSocket connection state
pub struct WsState {
    pub control: Arc<ControlHandler>,
    pub send_queues: Arc<ConnectionSendQueues>,
    /// Outbound frames buffered per connection
    pub send_buffer: usize,
    /// Upper bound on flushing a closing connection's queue
    pub drain_timeout: Duration,
    /// Flips to true when every connection should close
    pub close_connections: watch::Receiver<bool>,
    pub tracker: Arc<ConnectionTracker>,
}

/// Handle WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    // Counted from here so shutdown also waits for upgrades still in progress.
    let guard = state.tracker.enter();
    ws.on_upgrade(move |socket| handle_socket(socket, state, guard))
}

/// Handle one WebSocket connection from open to close
///
/// `_guard` is released only after the writer has flushed or been aborted.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>, _guard: ConnectionGuard) {
    let connection = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();

    let mut outbound = state.send_queues.open(connection, state.send_buffer);
    state.control.on_open(connection);

    // Sole writer for this socket; every broadcast goes through its queue.
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut close_connections = state.close_connections.clone();
    let mut writer_done = false;

    loop {
        if *close_connections.borrow() {
            break;
        }

        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.control.on_message(connection, text.as_str().as_bytes());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = state.control.on_message(connection, &bytes);
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by axum
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %connection, error = %e, "WebSocket read error");
                    break;
                }
            },
            _ = &mut send_task => {
                writer_done = true;
                break;
            }
            changed = close_connections.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    // Leave every subscriber set before the handle goes away.
    state.control.on_close(connection);
    state.send_queues.unregister(connection);

    if !writer_done
        && tokio::time::timeout(state.drain_timeout, &mut send_task)
            .await
            .is_err()
    {
        tracing::debug!(connection = %connection, "Drain timeout; dropping queued frames");
        send_task.abort();
    }
}
