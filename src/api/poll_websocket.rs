use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::Result;
use crate::poll::{ConnectionId, InboundEvent, PollServer};

pub async fn handle_poll_websocket(websocket: WebSocket, server: PollServer) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = match server.connect(tx) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Rejecting WebSocket connection");
            let _ = ws_sender.close().await;
            return;
        }
    };

    // Drains the session's outbound queue; stops after a close frame
    let writer_id = connection_id.clone();
    let mut sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(connection_id = %writer_id, error = %e, "Failed to send WebSocket message");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // A finished writer means the session closed this connection (kick).
    // Leaving the loop drops both halves, which closes the TCP stream
    // whether or not the client answers the close frame.
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(message)) => {
                    if let Err(e) = handle_websocket_message(&server, &connection_id, message) {
                        tracing::error!(connection_id = %connection_id, error = %e, "Error handling WebSocket message");
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },
            _ = &mut sender_task => {
                tracing::debug!(connection_id = %connection_id, "Outbound queue closed, dropping connection");
                break;
            }
        }
    }

    if let Err(e) = server.disconnect(&connection_id) {
        tracing::error!(connection_id = %connection_id, error = %e, "Failed to report disconnect");
    }
    sender_task.abort();
    drop(ws_receiver);
    tracing::debug!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Unparseable frames are logged and skipped; only a dead session is fatal.
fn handle_websocket_message(
    server: &PollServer,
    connection_id: &ConnectionId,
    message: Message,
) -> Result<()> {
    let Ok(text) = message.to_str() else {
        return Ok(());
    };

    tracing::debug!(connection_id = %connection_id, "Received message: {}", text);

    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) => server.dispatch(connection_id, event),
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                raw_message = %text,
                "Failed to parse event"
            );
            Ok(())
        }
    }
}
