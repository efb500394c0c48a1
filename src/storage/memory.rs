//! In-memory persistence sink, used by tests and development setups

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::storage::traits::{
    EmergencyRecord, LocationRecord, MessageRecord, PersistenceSink,
};

#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<MessageRecord>>,
    locations: Mutex<Vec<LocationRecord>>,
    emergencies: Mutex<Vec<EmergencyRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn location_count(&self) -> usize {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn emergency_count(&self) -> usize {
        self.emergencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn persist_message(&self, record: MessageRecord) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn persist_location(&self, record: LocationRecord) -> Result<()> {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn persist_emergency(&self, record: EmergencyRecord) -> Result<()> {
        self.emergencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}
