use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::auth::role::Role;
use crate::core::connection::Connection;
use crate::core::events::ServerEvent;

struct SessionState {
    connections: HashMap<String, Connection>,
    /// user id -> connection id, most recent registration wins
    by_user: HashMap<String, String>,
}

// Manages live client connections and their identities
pub struct SessionManager {
    state: RwLock<SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState {
                connections: HashMap::new(),
                by_user: HashMap::new(),
            }),
        }
    }

    // Register a new client connection
    pub async fn register(&self, connection: Connection) {
        let mut state = self.state.write().await;
        state
            .by_user
            .insert(connection.user_id.clone(), connection.id.clone());
        state.connections.insert(connection.id.clone(), connection);
    }

    // Remove a client connection, returning its identity if it was known
    pub async fn unregister(&self, connection_id: &str) -> Option<(String, Role)> {
        let mut state = self.state.write().await;
        let connection = state.connections.remove(connection_id)?;
        // Only drop the user index entry if it still points at this connection
        if state.by_user.get(&connection.user_id) == Some(&connection.id) {
            state.by_user.remove(&connection.user_id);
        }
        Some((connection.user_id, connection.role))
    }

    /// Identity bound to a connection for its lifetime
    pub async fn identity(&self, connection_id: &str) -> Option<(String, Role)> {
        let state = self.state.read().await;
        state
            .connections
            .get(connection_id)
            .map(|c| (c.user_id.clone(), c.role))
    }

    /// Connection currently serving a user, if any
    pub async fn connection_for_user(&self, user_id: &str) -> Option<String> {
        let state = self.state.read().await;
        state.by_user.get(user_id).cloned()
    }

    /// Unicast an event to one connection
    pub async fn send_to(&self, connection_id: &str, event: &ServerEvent) -> bool {
        let state = self.state.read().await;
        match state.connections.get(connection_id) {
            Some(connection) => connection.send_event(event),
            None => false,
        }
    }

    /// Send an event to a resolved recipient set, returning the delivered count
    pub async fn send_to_many(&self, recipients: &HashSet<String>, event: &ServerEvent) -> usize {
        let state = self.state.read().await;
        let mut delivered = 0;
        for connection_id in recipients {
            if let Some(connection) = state.connections.get(connection_id) {
                if connection.send_event(event) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    // Get current clients count
    pub async fn client_count(&self) -> usize {
        let state = self.state.read().await;
        state.connections.len()
    }
}
