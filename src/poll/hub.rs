use std::collections::HashMap;

use tokio::sync::mpsc;
use warp::ws::Message;

use super::events::OutboundEvent;
use super::registry::ConnectionId;
use crate::error::{PollError, Result};

/// Outbound side of every live connection.
///
/// Each entry feeds a writer task that owns the WebSocket sink, so sending
/// never blocks the session.
#[derive(Default)]
pub struct Hub {
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, connection_id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        self.senders.insert(connection_id, sender);
    }

    /// Drops the sender; the writer task ends once its queue drains.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        self.senders.remove(connection_id).is_some()
    }

    pub fn emit_to(&self, connection_id: &ConnectionId, event: &OutboundEvent) -> Result<()> {
        let sender = self
            .senders
            .get(connection_id)
            .ok_or_else(|| PollError::ConnectionNotFound(connection_id.to_string()))?;

        let message = Message::text(serde_json::to_string(event)?);
        sender
            .send(message)
            .map_err(|_| PollError::transport(format!("writer for {} is gone", connection_id)))
    }

    /// Sends the event to every connection. Returns how many accepted it.
    pub fn broadcast(&self, event: &OutboundEvent) -> Result<usize> {
        let text = serde_json::to_string(event)?;
        let mut delivered = 0;

        for (connection_id, sender) in &self.senders {
            if sender.send(Message::text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(
                    connection_id = %connection_id,
                    event = event.name(),
                    "Skipping broadcast to closed connection"
                );
            }
        }

        Ok(delivered)
    }

    /// Queues a close frame and forgets the connection.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> bool {
        match self.senders.remove(connection_id) {
            Some(sender) => {
                let _ = sender.send(Message::close());
                true
            }
            None => false,
        }
    }
}
