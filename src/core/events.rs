//! Event catalog for the presence engine
//!
//! Inbound and outbound events are closed tagged enums so that adding an
//! event kind is a compiler-checked change, not a runtime-discovered one.
//! Wire shape: JSON with a `type` tag and camelCase fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RideRelayError};
use crate::auth::role::Role;

/// Geographic position carried by location events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Client-to-server events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Enter a conversation topic channel
    #[serde(rename = "chat:join", rename_all = "camelCase")]
    ChatJoin { conversation_id: String },

    /// Leave a conversation topic channel
    #[serde(rename = "chat:leave", rename_all = "camelCase")]
    ChatLeave { conversation_id: String },

    /// Send a chat message to a conversation
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        conversation_id: String,
        message: String,
    },

    /// Start (or refresh) a typing indicator
    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { conversation_id: String },

    /// Stop a typing indicator
    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { conversation_id: String },

    /// Publish the rider's current position to watchers
    #[serde(rename = "location:update", rename_all = "camelCase")]
    LocationUpdate {
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
        battery_level: Option<f64>,
        address: Option<String>,
    },

    /// Subscribe to a rider's live location (Police and above)
    #[serde(rename = "location:subscribe", rename_all = "camelCase")]
    LocationSubscribe { rider_id: String },

    /// Drop a live-location subscription
    #[serde(rename = "location:unsubscribe", rename_all = "camelCase")]
    LocationUnsubscribe { rider_id: String },

    /// Emergency escalation from a rider
    #[serde(rename = "location:emergency", rename_all = "camelCase")]
    LocationEmergency {
        latitude: f64,
        longitude: f64,
        message: Option<String>,
    },
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake accepted
    #[serde(rename = "session:ready", rename_all = "camelCase")]
    SessionReady {
        connection_id: String,
        user_id: String,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// Conversation join acknowledgement
    #[serde(rename = "chat:joined", rename_all = "camelCase")]
    ChatJoined {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Conversation leave acknowledgement
    #[serde(rename = "chat:left", rename_all = "camelCase")]
    ChatLeft {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Chat message fan-out to the conversation
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        conversation_id: String,
        message_id: String,
        sender_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Delivery acknowledgement to the sender
    #[serde(rename = "message:sent", rename_all = "camelCase")]
    MessageSent {
        conversation_id: String,
        message_id: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart {
        conversation_id: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop {
        conversation_id: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Live position of a tracked rider
    #[serde(rename = "rider:location", rename_all = "camelCase")]
    RiderLocation {
        rider_id: String,
        rider_role: Role,
        coordinates: Coordinates,
        #[serde(skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        battery_level: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "location:subscribed", rename_all = "camelCase")]
    LocationSubscribed {
        rider_id: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "location:unsubscribed", rename_all = "camelCase")]
    LocationUnsubscribed {
        rider_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Emergency escalation, always priority "urgent"
    #[serde(rename = "rider:emergency", rename_all = "camelCase")]
    RiderEmergency {
        rider_id: String,
        rider_role: Role,
        coordinates: Coordinates,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        priority: String,
        timestamp: DateTime<Utc>,
    },

    /// Error envelope, always unicast to the originating connection
    #[serde(rename = "error")]
    Error { message: String },
}

fn require_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RideRelayError::ValidationError(format!(
            "Missing required field: {}",
            field
        )));
    }
    Ok(())
}

fn require_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    // Range checks also reject NaN
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(RideRelayError::ValidationError(
            "latitude must be between -90 and 90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(RideRelayError::ValidationError(
            "longitude must be between -180 and 180".to_string(),
        ));
    }
    Ok(())
}

impl ClientEvent {
    /// Reject malformed payloads before any state change
    pub fn validate(&self, max_message_length: usize) -> Result<()> {
        match self {
            Self::ChatJoin { conversation_id }
            | Self::ChatLeave { conversation_id }
            | Self::TypingStart { conversation_id }
            | Self::TypingStop { conversation_id } => {
                require_id(conversation_id, "conversationId")
            }
            Self::MessageNew {
                conversation_id,
                message,
            } => {
                require_id(conversation_id, "conversationId")?;
                if message.trim().is_empty() {
                    return Err(RideRelayError::ValidationError(
                        "Message cannot be empty".to_string(),
                    ));
                }
                if message.len() > max_message_length {
                    return Err(RideRelayError::ValidationError(format!(
                        "Message too long. Maximum {} characters allowed",
                        max_message_length
                    )));
                }
                Ok(())
            }
            Self::LocationUpdate {
                latitude, longitude, ..
            } => require_coordinates(*latitude, *longitude),
            Self::LocationSubscribe { rider_id } | Self::LocationUnsubscribe { rider_id } => {
                require_id(rider_id, "riderId")
            }
            Self::LocationEmergency {
                latitude, longitude, ..
            } => require_coordinates(*latitude, *longitude),
        }
    }
}
