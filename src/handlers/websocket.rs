use std::collections::HashMap;
use std::sync::Arc;
use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use warp::ws::WebSocket;

use crate::auth::role::Role;
use crate::core::engine::PresenceEngine;
use crate::core::events::ClientEvent;
use crate::error::{Result, RideRelayError};

/// Identity resolved by the external identity provider, carried on the
/// handshake. Token verification happens upstream; the engine only consumes
/// the result.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_id: String,
    pub role: Role,
    /// Opt into the global monitoring/tracking feeds (privileged roles only)
    pub monitor: bool,
}

impl ClientIdentity {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let user_id = params
            .get("user_id")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RideRelayError::ValidationError("Missing required field: user_id".to_string())
            })?;
        let role = params
            .get("role")
            .and_then(|r| Role::from_str(r))
            .ok_or_else(|| {
                RideRelayError::ValidationError("Missing or unknown role".to_string())
            })?;
        let monitor = params
            .get("monitor")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            user_id: user_id.to_string(),
            role,
            monitor,
        })
    }
}

// Handle a WebSocket connection for an authenticated identity
pub async fn handle_ws_client(
    ws: WebSocket,
    engine: Arc<PresenceEngine>,
    identity: ClientIdentity,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Forward events from the connection's channel to the WebSocket
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let connection_id = engine
        .connect(identity.user_id.clone(), identity.role, tx)
        .await;

    if identity.monitor {
        if let Err(e) = engine.join_monitoring(&connection_id).await {
            warn!(
                "Connection {} denied monitoring feed: {}",
                connection_id, e
            );
            engine.send_error(&connection_id, &e).await;
        } else if let Err(e) = engine.join_tracking(&connection_id).await {
            warn!("Connection {} denied tracking feed: {}", connection_id, e);
            engine.send_error(&connection_id, &e).await;
        }
    }

    // Handle incoming events until the transport closes
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    match serde_json::from_str::<ClientEvent>(text) {
                        Ok(event) => engine.handle_event(&connection_id, event).await,
                        Err(e) => {
                            debug!(
                                "Unparseable event from connection {}: {}",
                                connection_id, e
                            );
                            engine
                                .send_error(
                                    &connection_id,
                                    &RideRelayError::MessageParseError(e.to_string()),
                                )
                                .await;
                        }
                    }
                } else if msg.is_close() {
                    info!("Connection {} sent close frame", connection_id);
                }
            }
            Err(e) => {
                error!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Transport gone; unwind typing, subscriptions, and channel membership
    engine.disconnect(&connection_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identity_from_query() {
        let identity =
            ClientIdentity::from_query(&params(&[("user_id", "u1"), ("role", "police")]))
                .unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.role, Role::Police);
        assert!(!identity.monitor);

        let identity = ClientIdentity::from_query(&params(&[
            ("user_id", "u1"),
            ("role", "admin"),
            ("monitor", "true"),
        ]))
        .unwrap();
        assert!(identity.monitor);
    }

    #[test]
    fn test_identity_rejects_missing_fields() {
        assert!(ClientIdentity::from_query(&params(&[("role", "police")])).is_err());
        assert!(ClientIdentity::from_query(&params(&[("user_id", "u1")])).is_err());
        assert!(
            ClientIdentity::from_query(&params(&[("user_id", " "), ("role", "police")])).is_err()
        );
        assert!(
            ClientIdentity::from_query(&params(&[("user_id", "u1"), ("role", "pilot")])).is_err()
        );
    }
}
