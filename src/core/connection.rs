//! WebSocket connection state
//! A connection is bound to exactly one (user, role) pair for its lifetime

use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message;

use crate::auth::role::Role;
use crate::core::events::ServerEvent;
use log::warn;

/// Represents the state of a single WebSocket connection
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(user_id: String, role: Role, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            role,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Send a serialized event through this connection
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize event for client {}: {}", self.id, e);
                return false;
            }
        };
        match self.sender.send(Message::text(payload)) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send event to client {}", self.id);
                false
            }
        }
    }
}
