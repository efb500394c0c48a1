//! Broadcast routing and event authorization
//!
//! The router is a pure dispatch function over materialized membership state:
//! it resolves an addressing target into a concrete recipient set, deduplicates
//! across overlapping channels, excludes the origin connection where
//! notify-others semantics apply, and gates inbound events by role or
//! membership. It holds no mutable state of its own.

use std::collections::HashSet;
use std::sync::Arc;
use log::debug;

use crate::auth::role::Role;
use crate::core::channel::{ChannelId, ChannelRegistry};
use crate::core::events::{ClientEvent, ServerEvent};
use crate::core::session::SessionManager;
use crate::error::{Result, RideRelayError};

/// Addressing mode for an outbound event
#[derive(Debug, Clone)]
pub enum Target {
    /// A single connection
    Connection(String),
    /// Every member of one channel
    Channel(ChannelId),
    /// Every member of any of the listed channels, exactly once each
    Channels(Vec<ChannelId>),
}

pub struct BroadcastRouter {
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    min_tracking_role: Role,
}

impl BroadcastRouter {
    pub fn new(
        sessions: Arc<SessionManager>,
        channels: Arc<ChannelRegistry>,
        min_tracking_role: Role,
    ) -> Self {
        Self {
            sessions,
            channels,
            min_tracking_role,
        }
    }

    /// Per-event-kind authorization predicate, applied before any state
    /// change or fan-out. Failure leaves state untouched.
    pub async fn authorize(
        &self,
        connection_id: &str,
        role: Role,
        event: &ClientEvent,
    ) -> Result<()> {
        match event {
            ClientEvent::LocationSubscribe { .. } => {
                if role < self.min_tracking_role {
                    return Err(RideRelayError::PermissionDenied(format!(
                        "role {} may not subscribe to rider locations",
                        role.as_str()
                    )));
                }
                Ok(())
            }
            ClientEvent::MessageNew {
                conversation_id, ..
            }
            | ClientEvent::TypingStart { conversation_id }
            | ClientEvent::TypingStop { conversation_id } => {
                let channel = ChannelId::Conversation(conversation_id.clone());
                if !self.channels.is_member(connection_id, &channel).await {
                    return Err(RideRelayError::PermissionDenied(format!(
                        "connection is not a member of conversation {}",
                        conversation_id
                    )));
                }
                Ok(())
            }
            // Joining/leaving conversations, publishing one's own location,
            // unsubscribing, and escalating are open to every identity
            ClientEvent::ChatJoin { .. }
            | ClientEvent::ChatLeave { .. }
            | ClientEvent::LocationUpdate { .. }
            | ClientEvent::LocationUnsubscribe { .. }
            | ClientEvent::LocationEmergency { .. } => Ok(()),
        }
    }

    /// Publish an event to the resolved recipient set.
    /// Returns the number of connections the event was delivered to.
    pub async fn publish(
        &self,
        event: &ServerEvent,
        target: Target,
        origin: Option<&str>,
    ) -> usize {
        let mut recipients: HashSet<String> = match target {
            Target::Connection(connection_id) => {
                let mut set = HashSet::new();
                set.insert(connection_id);
                set
            }
            Target::Channel(channel) => self.channels.members_of(&channel).await,
            Target::Channels(channels) => {
                let mut set = HashSet::new();
                for channel in &channels {
                    set.extend(self.channels.members_of(channel).await);
                }
                set
            }
        };

        if let Some(origin_id) = origin {
            recipients.remove(origin_id);
        }

        if recipients.is_empty() {
            return 0;
        }

        let delivered = self.sessions.send_to_many(&recipients, event).await;
        debug!(
            "Published event to {}/{} resolved recipients",
            delivered,
            recipients.len()
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::Connection;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use warp::ws::Message;

    async fn setup() -> (
        BroadcastRouter,
        Arc<SessionManager>,
        Arc<ChannelRegistry>,
        String,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let sessions = Arc::new(SessionManager::new());
        let channels = Arc::new(ChannelRegistry::new());
        let router = BroadcastRouter::new(
            Arc::clone(&sessions),
            Arc::clone(&channels),
            Role::Police,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new("u1".to_string(), Role::Rider, tx);
        let connection_id = connection.id.clone();
        sessions.register(connection).await;
        (router, sessions, channels, connection_id, rx)
    }

    fn ack() -> ServerEvent {
        ServerEvent::ChatJoined {
            conversation_id: "c1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_overlapping_channels_deliver_once() {
        let (router, _sessions, channels, connection_id, mut rx) = setup().await;
        channels.join(&connection_id, ChannelId::Role(Role::Rider)).await;
        channels.join(&connection_id, ChannelId::Monitoring).await;

        let delivered = router
            .publish(
                &ack(),
                Target::Channels(vec![ChannelId::Role(Role::Rider), ChannelId::Monitoring]),
                None,
            )
            .await;
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_origin_is_excluded() {
        let (router, _sessions, channels, connection_id, mut rx) = setup().await;
        let conversation = ChannelId::Conversation("c1".to_string());
        channels.join(&connection_id, conversation.clone()).await;

        let delivered = router
            .publish(&ack(), Target::Channel(conversation), Some(&connection_id))
            .await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_authorize_gates_subscribe_by_role() {
        let (router, _sessions, _channels, connection_id, _rx) = setup().await;
        let event = ClientEvent::LocationSubscribe {
            rider_id: "r1".to_string(),
        };

        let denied = router.authorize(&connection_id, Role::Volunteer, &event).await;
        assert!(matches!(denied, Err(RideRelayError::PermissionDenied(_))));
        assert!(router
            .authorize(&connection_id, Role::Police, &event)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_authorize_requires_conversation_membership() {
        let (router, _sessions, channels, connection_id, _rx) = setup().await;
        let event = ClientEvent::TypingStart {
            conversation_id: "c1".to_string(),
        };

        let denied = router.authorize(&connection_id, Role::Rider, &event).await;
        assert!(matches!(denied, Err(RideRelayError::PermissionDenied(_))));

        channels
            .join(&connection_id, ChannelId::Conversation("c1".to_string()))
            .await;
        assert!(router
            .authorize(&connection_id, Role::Rider, &event)
            .await
            .is_ok());
    }
}
