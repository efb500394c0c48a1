//! Channel membership bookkeeping
//!
//! Channels are addressable broadcast groups with no independent lifecycle:
//! they exist while at least one member is registered and their member sets
//! are garbage-collected eagerly when they empty out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::RwLock;

use crate::auth::role::Role;

/// Addressable broadcast group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// A single user's personal channel
    User(String),
    /// All connections sharing a role
    Role(Role),
    /// One conversation's topic channel
    Conversation(String),
    /// Global live-location feed (opt-in)
    Tracking,
    /// Global emergency/ops feed (opt-in)
    Monitoring,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Role(role) => write!(f, "role:{}", role.as_str()),
            Self::Conversation(id) => write!(f, "conversation:{}", id),
            Self::Tracking => write!(f, "tracking"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}

struct RegistryState {
    /// channel -> member connection ids
    members: HashMap<ChannelId, HashSet<String>>,
    /// connection id -> channels it belongs to
    memberships: HashMap<String, HashSet<ChannelId>>,
}

/// Manages channel membership for all live connections.
///
/// Both direction maps live under one lock so they can never diverge.
pub struct ChannelRegistry {
    state: RwLock<RegistryState>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                members: HashMap::new(),
                memberships: HashMap::new(),
            }),
        }
    }

    /// Add a connection to a channel. Joining twice is idempotent.
    pub async fn join(&self, connection_id: &str, channel: ChannelId) {
        let mut state = self.state.write().await;
        state
            .members
            .entry(channel.clone())
            .or_insert_with(HashSet::new)
            .insert(connection_id.to_string());
        state
            .memberships
            .entry(connection_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(channel);
    }

    /// Remove a connection from a channel. Leaving a non-member channel is a no-op.
    pub async fn leave(&self, connection_id: &str, channel: &ChannelId) {
        let mut state = self.state.write().await;
        Self::remove_membership(&mut state, connection_id, channel);
    }

    fn remove_membership(state: &mut RegistryState, connection_id: &str, channel: &ChannelId) {
        if let Some(members) = state.members.get_mut(channel) {
            members.remove(connection_id);
            if members.is_empty() {
                state.members.remove(channel);
            }
        }
        if let Some(channels) = state.memberships.get_mut(connection_id) {
            channels.remove(channel);
            if channels.is_empty() {
                state.memberships.remove(connection_id);
            }
        }
    }

    /// Current member set of a channel (empty if the channel has no members)
    pub async fn members_of(&self, channel: &ChannelId) -> HashSet<String> {
        let state = self.state.read().await;
        state.members.get(channel).cloned().unwrap_or_default()
    }

    /// Channels a connection currently belongs to
    pub async fn channels_of(&self, connection_id: &str) -> HashSet<ChannelId> {
        let state = self.state.read().await;
        state
            .memberships
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_member(&self, connection_id: &str, channel: &ChannelId) -> bool {
        let state = self.state.read().await;
        state
            .members
            .get(channel)
            .map(|members| members.contains(connection_id))
            .unwrap_or(false)
    }

    /// Remove a connection from every channel it belongs to, in
    /// O(number of memberships). The identity channel goes last so derived
    /// cleanup broadcasts still had a delivery path for everyone else.
    pub async fn remove_connection(&self, connection_id: &str) -> usize {
        let mut state = self.state.write().await;
        let Some(channels) = state.memberships.get(connection_id).cloned() else {
            return 0;
        };

        let removed = channels.len();
        let mut identity_channels = Vec::new();
        for channel in channels {
            if matches!(channel, ChannelId::User(_)) {
                identity_channels.push(channel);
                continue;
            }
            Self::remove_membership(&mut state, connection_id, &channel);
        }
        for channel in identity_channels {
            Self::remove_membership(&mut state, connection_id, &channel);
        }
        removed
    }
}
