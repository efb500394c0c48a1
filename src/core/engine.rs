//! Presence engine coordinating sessions, channels, subscriptions, and typing
//!
//! Owns every shared mutable structure of the real-time layer and exposes the
//! single exhaustive dispatcher for inbound events. An engine is an explicit,
//! dependency-injected instance; nothing here is process-global.

use std::collections::HashSet;
use std::sync::Arc;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message as WsMessage;

use crate::auth::role::Role;
use crate::config::EngineConfig;
use crate::core::channel::{ChannelId, ChannelRegistry};
use crate::core::connection::Connection;
use crate::core::events::{ClientEvent, Coordinates, ServerEvent};
use crate::core::router::{BroadcastRouter, Target};
use crate::core::session::SessionManager;
use crate::core::subscription::{SubscriptionIndex, TrackingStats};
use crate::core::typing::{TypingKey, TypingTracker};
use crate::error::{Result, RideRelayError};
use crate::storage::traits::{
    EmergencyRecord, LocationRecord, MessageRecord, PersistenceSink,
};

pub struct PresenceEngine {
    config: EngineConfig,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelRegistry>,
    subscriptions: SubscriptionIndex,
    typing: TypingTracker,
    router: BroadcastRouter,
    persistence: Arc<dyn PersistenceSink>,
}

impl PresenceEngine {
    /// Build an engine and start its expiry pump
    pub fn new(config: EngineConfig, persistence: Arc<dyn PersistenceSink>) -> Arc<Self> {
        let sessions = Arc::new(SessionManager::new());
        let channels = Arc::new(ChannelRegistry::new());
        let (typing, expired_rx) = TypingTracker::new(config.typing_timeout);
        let router = BroadcastRouter::new(
            Arc::clone(&sessions),
            Arc::clone(&channels),
            config.min_tracking_role,
        );
        let subscriptions = SubscriptionIndex::new(config.min_tracking_role);

        let engine = Arc::new(Self {
            config,
            sessions,
            channels,
            subscriptions,
            typing,
            router,
            persistence,
        });
        Self::spawn_expiry_pump(&engine, expired_rx);
        engine
    }

    /// Turn tracker timeouts into the same stop broadcast a manual
    /// `typing:stop` would have produced
    fn spawn_expiry_pump(engine: &Arc<Self>, mut expired_rx: mpsc::UnboundedReceiver<TypingKey>) {
        let weak = Arc::downgrade(engine);
        tokio::spawn(async move {
            while let Some(key) = expired_rx.recv().await {
                let Some(engine) = weak.upgrade() else { break };
                debug!(
                    "Typing indicator expired for user {} in conversation {}",
                    key.user_id, key.conversation_id
                );
                let origin = engine.sessions.connection_for_user(&key.user_id).await;
                let event = ServerEvent::TypingStop {
                    conversation_id: key.conversation_id.clone(),
                    user_id: key.user_id.clone(),
                    timestamp: Utc::now(),
                };
                engine
                    .router
                    .publish(
                        &event,
                        Target::Channel(ChannelId::Conversation(key.conversation_id)),
                        origin.as_deref(),
                    )
                    .await;
            }
        });
    }

    /// Register a connection for an already-resolved identity.
    /// Joins the identity and role channels; nothing else is implicit.
    pub async fn connect(
        &self,
        user_id: String,
        role: Role,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> String {
        let connection = Connection::new(user_id.clone(), role, sender);
        let connection_id = connection.id.clone();
        self.sessions.register(connection).await;

        self.channels
            .join(&connection_id, ChannelId::User(user_id.clone()))
            .await;
        self.channels
            .join(&connection_id, ChannelId::Role(role))
            .await;

        let ready = ServerEvent::SessionReady {
            connection_id: connection_id.clone(),
            user_id: user_id.clone(),
            role,
            timestamp: Utc::now(),
        };
        self.sessions.send_to(&connection_id, &ready).await;

        info!(
            "Client connected: {} (user {}, role {})",
            connection_id,
            user_id,
            role.as_str()
        );
        connection_id
    }

    /// Opt a privileged connection into the global emergency/ops feed
    pub async fn join_monitoring(&self, connection_id: &str) -> Result<()> {
        self.join_feed(connection_id, ChannelId::Monitoring).await
    }

    /// Opt a privileged connection into the global live-location feed
    pub async fn join_tracking(&self, connection_id: &str) -> Result<()> {
        self.join_feed(connection_id, ChannelId::Tracking).await
    }

    async fn join_feed(&self, connection_id: &str, channel: ChannelId) -> Result<()> {
        let (_, role) = self
            .sessions
            .identity(connection_id)
            .await
            .ok_or_else(|| RideRelayError::SessionNotFound(connection_id.to_string()))?;
        if role < self.config.min_tracking_role {
            return Err(RideRelayError::PermissionDenied(format!(
                "role {} may not join the {} feed",
                role.as_str(),
                channel
            )));
        }
        self.channels.join(connection_id, channel).await;
        Ok(())
    }

    /// Handle one inbound event from a connection. Rejections are converted
    /// into a unicast error envelope; state is left untouched on failure.
    pub async fn handle_event(&self, connection_id: &str, event: ClientEvent) {
        let Some((user_id, role)) = self.sessions.identity(connection_id).await else {
            warn!("Dropping event from unknown connection {}", connection_id);
            return;
        };
        if let Err(e) = self.dispatch(connection_id, &user_id, role, event).await {
            debug!("Rejected event from connection {}: {}", connection_id, e);
            self.send_error(connection_id, &e).await;
        }
    }

    /// Unicast an error envelope to the originating connection only
    pub async fn send_error(&self, connection_id: &str, error: &RideRelayError) {
        let envelope = ServerEvent::Error {
            message: error.client_message(),
        };
        self.sessions.send_to(connection_id, &envelope).await;
    }

    async fn dispatch(
        &self,
        connection_id: &str,
        user_id: &str,
        role: Role,
        event: ClientEvent,
    ) -> Result<()> {
        event.validate(self.config.max_message_length)?;
        self.router.authorize(connection_id, role, &event).await?;

        match event {
            ClientEvent::ChatJoin { conversation_id } => {
                self.channels
                    .join(
                        connection_id,
                        ChannelId::Conversation(conversation_id.clone()),
                    )
                    .await;
                let ack = ServerEvent::ChatJoined {
                    conversation_id,
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(&ack, Target::Connection(connection_id.to_string()), None)
                    .await;
                Ok(())
            }

            ClientEvent::ChatLeave { conversation_id } => {
                self.channels
                    .leave(
                        connection_id,
                        &ChannelId::Conversation(conversation_id.clone()),
                    )
                    .await;
                let ack = ServerEvent::ChatLeft {
                    conversation_id,
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(&ack, Target::Connection(connection_id.to_string()), None)
                    .await;
                Ok(())
            }

            ClientEvent::MessageNew {
                conversation_id,
                message,
            } => {
                let message_id = Uuid::new_v4().to_string();
                let timestamp = Utc::now();
                self.notify_message(MessageRecord {
                    message_id: message_id.clone(),
                    conversation_id: conversation_id.clone(),
                    sender_id: user_id.to_string(),
                    content: message.clone(),
                    timestamp,
                });

                let outbound = ServerEvent::MessageNew {
                    conversation_id: conversation_id.clone(),
                    message_id: message_id.clone(),
                    sender_id: user_id.to_string(),
                    message,
                    timestamp,
                };
                self.router
                    .publish(
                        &outbound,
                        Target::Channel(ChannelId::Conversation(conversation_id.clone())),
                        Some(connection_id),
                    )
                    .await;

                let ack = ServerEvent::MessageSent {
                    conversation_id,
                    message_id,
                    timestamp,
                };
                self.router
                    .publish(&ack, Target::Connection(connection_id.to_string()), None)
                    .await;
                Ok(())
            }

            ClientEvent::TypingStart { conversation_id } => {
                self.typing.start(TypingKey {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                });
                let outbound = ServerEvent::TypingStart {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(
                        &outbound,
                        Target::Channel(ChannelId::Conversation(conversation_id)),
                        Some(connection_id),
                    )
                    .await;
                Ok(())
            }

            ClientEvent::TypingStop { conversation_id } => {
                self.typing.stop(&TypingKey {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                });
                let outbound = ServerEvent::TypingStop {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(
                        &outbound,
                        Target::Channel(ChannelId::Conversation(conversation_id)),
                        Some(connection_id),
                    )
                    .await;
                Ok(())
            }

            ClientEvent::LocationUpdate {
                latitude,
                longitude,
                accuracy,
                speed,
                heading,
                battery_level,
                address,
            } => {
                let coordinates = Coordinates {
                    latitude,
                    longitude,
                };
                let timestamp = Utc::now();
                self.notify_location(LocationRecord {
                    rider_id: user_id.to_string(),
                    coordinates,
                    accuracy,
                    speed,
                    heading,
                    battery_level,
                    address: address.clone(),
                    timestamp,
                });

                // Each watcher's identity channel plus the global feed
                let watchers = self.subscriptions.watchers_of(user_id).await;
                let mut targets: Vec<ChannelId> =
                    watchers.into_iter().map(ChannelId::User).collect();
                targets.push(ChannelId::Tracking);

                let outbound = ServerEvent::RiderLocation {
                    rider_id: user_id.to_string(),
                    rider_role: role,
                    coordinates,
                    accuracy,
                    speed,
                    heading,
                    battery_level,
                    address,
                    timestamp,
                };
                self.router
                    .publish(&outbound, Target::Channels(targets), Some(connection_id))
                    .await;
                Ok(())
            }

            ClientEvent::LocationSubscribe { rider_id } => {
                self.subscriptions
                    .subscribe(user_id, role, &rider_id)
                    .await?;
                let ack = ServerEvent::LocationSubscribed {
                    rider_id,
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(&ack, Target::Connection(connection_id.to_string()), None)
                    .await;
                Ok(())
            }

            ClientEvent::LocationUnsubscribe { rider_id } => {
                self.subscriptions.unsubscribe(user_id, &rider_id).await;
                let ack = ServerEvent::LocationUnsubscribed {
                    rider_id,
                    timestamp: Utc::now(),
                };
                self.router
                    .publish(&ack, Target::Connection(connection_id.to_string()), None)
                    .await;
                Ok(())
            }

            ClientEvent::LocationEmergency {
                latitude,
                longitude,
                message,
            } => {
                let coordinates = Coordinates {
                    latitude,
                    longitude,
                };
                let timestamp = Utc::now();
                self.notify_emergency(EmergencyRecord {
                    rider_id: user_id.to_string(),
                    coordinates,
                    message: message.clone(),
                    timestamp,
                });

                let mut targets: Vec<ChannelId> = Role::escalation_roles()
                    .into_iter()
                    .map(ChannelId::Role)
                    .collect();
                targets.push(ChannelId::Monitoring);

                let outbound = ServerEvent::RiderEmergency {
                    rider_id: user_id.to_string(),
                    rider_role: role,
                    coordinates,
                    message,
                    priority: "urgent".to_string(),
                    timestamp,
                };
                let delivered = self
                    .router
                    .publish(&outbound, Target::Channels(targets), None)
                    .await;
                info!(
                    "Emergency from user {} fanned out to {} connections",
                    user_id, delivered
                );
                Ok(())
            }
        }
    }

    /// Full reverse cleanup for a departing connection.
    /// Typing and subscription state is unwound before channel removal so the
    /// derived stop broadcasts still have a delivery path; the identity
    /// channel is removed last. Cleanup is total and cannot fail.
    pub async fn disconnect(&self, connection_id: &str) {
        let Some((user_id, _role)) = self.sessions.identity(connection_id).await else {
            return;
        };

        let owner = user_id.clone();
        let cleared = self.typing.clear_matching(|key| key.user_id == owner);
        for key in cleared {
            let event = ServerEvent::TypingStop {
                conversation_id: key.conversation_id.clone(),
                user_id: user_id.clone(),
                timestamp: Utc::now(),
            };
            self.router
                .publish(
                    &event,
                    Target::Channel(ChannelId::Conversation(key.conversation_id)),
                    Some(connection_id),
                )
                .await;
        }

        // The user may be a watcher and a subject at the same time
        self.subscriptions.clear_all_for_watcher(&user_id).await;
        self.subscriptions.clear_all_for_subject(&user_id).await;

        self.channels.remove_connection(connection_id).await;
        self.sessions.unregister(connection_id).await;

        info!("Client disconnected: {} (user {})", connection_id, user_id);
        info!(
            "Current connections: {}",
            self.sessions.client_count().await
        );
    }

    fn notify_message(&self, record: MessageRecord) {
        let sink = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            if let Err(e) = sink.persist_message(record).await {
                warn!("Persistence sink rejected message: {}", e);
            }
        });
    }

    fn notify_location(&self, record: LocationRecord) {
        let sink = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            if let Err(e) = sink.persist_location(record).await {
                warn!("Persistence sink rejected location: {}", e);
            }
        });
    }

    fn notify_emergency(&self, record: EmergencyRecord) {
        let sink = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            if let Err(e) = sink.persist_emergency(record).await {
                warn!("Persistence sink rejected emergency: {}", e);
            }
        });
    }

    // --- Read-only introspection for operational tooling ---

    pub async fn subscriber_count(&self, subject_id: &str) -> usize {
        self.subscriptions.watcher_count(subject_id).await
    }

    pub async fn tracking_stats(&self) -> TrackingStats {
        self.subscriptions.stats().await
    }

    pub async fn connection_count(&self) -> usize {
        self.sessions.client_count().await
    }

    pub async fn subjects_of(&self, watcher_id: &str) -> HashSet<String> {
        self.subscriptions.subjects_of(watcher_id).await
    }

    pub async fn watchers_of(&self, subject_id: &str) -> HashSet<String> {
        self.subscriptions.watchers_of(subject_id).await
    }

    pub fn typing_is_active(&self, conversation_id: &str, user_id: &str) -> bool {
        self.typing.is_active(&TypingKey {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
