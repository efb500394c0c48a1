//! Persistence notification interface
//!
//! Durable writes belong to the REST/SQL layer; this engine only notifies a
//! sink about state it mirrored live. Notifications are fire-and-forget: the
//! dispatch path spawns them and never blocks on the sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::events::Coordinates;
use crate::error::Result;

/// Chat message mirrored to persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Rider position mirrored to persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub rider_id: String,
    pub coordinates: Coordinates,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub battery_level: Option<f64>,
    pub address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Emergency escalation mirrored to persistence (and the push layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub rider_id: String,
    pub coordinates: Coordinates,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Downstream sink for state changes the engine mirrors live
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist_message(&self, record: MessageRecord) -> Result<()>;

    async fn persist_location(&self, record: LocationRecord) -> Result<()>;

    async fn persist_emergency(&self, record: EmergencyRecord) -> Result<()>;
}

/// Sink that discards everything; the default for a standalone engine
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn persist_message(&self, _record: MessageRecord) -> Result<()> {
        Ok(())
    }

    async fn persist_location(&self, _record: LocationRecord) -> Result<()> {
        Ok(())
    }

    async fn persist_emergency(&self, _record: EmergencyRecord) -> Result<()> {
        Ok(())
    }
}
