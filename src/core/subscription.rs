//! Bidirectional watcher/subject subscription registry
//!
//! A subscription exists in the forward index (subject -> watchers) iff it
//! exists in the reverse index (watcher -> subjects). Both maps are mutated
//! under one write lock so the mirror invariant is atomic for every reader.

use std::collections::{HashMap, HashSet};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::auth::role::Role;
use crate::error::{Result, RideRelayError};

/// Aggregate live-tracking statistics for operational tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    /// Subjects with at least one watcher
    pub tracked_subjects: usize,
    /// Watchers with at least one subscription
    pub active_watchers: usize,
    /// Total watcher/subject edges
    pub subscription_links: usize,
}

struct IndexState {
    watchers_by_subject: HashMap<String, HashSet<String>>,
    subjects_by_watcher: HashMap<String, HashSet<String>>,
}

pub struct SubscriptionIndex {
    state: RwLock<IndexState>,
    min_role: Role,
}

impl SubscriptionIndex {
    pub fn new(min_role: Role) -> Self {
        Self {
            state: RwLock::new(IndexState {
                watchers_by_subject: HashMap::new(),
                subjects_by_watcher: HashMap::new(),
            }),
            min_role,
        }
    }

    /// Register a watcher on a subject. Requires `watcher_role >= min_role`;
    /// re-subscribing is a silent no-op. Returns whether the edge is new.
    pub async fn subscribe(
        &self,
        watcher_id: &str,
        watcher_role: Role,
        subject_id: &str,
    ) -> Result<bool> {
        if watcher_role < self.min_role {
            return Err(RideRelayError::PermissionDenied(format!(
                "role {} may not subscribe to rider locations",
                watcher_role.as_str()
            )));
        }

        let mut state = self.state.write().await;
        let added = state
            .watchers_by_subject
            .entry(subject_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(watcher_id.to_string());
        state
            .subjects_by_watcher
            .entry(watcher_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(subject_id.to_string());
        Ok(added)
    }

    /// Remove a watcher/subject edge from both indices. Removing an absent
    /// edge is a no-op, not an error. Returns whether an edge was removed.
    pub async fn unsubscribe(&self, watcher_id: &str, subject_id: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = Self::detach(&mut state.watchers_by_subject, subject_id, watcher_id);
        Self::detach(&mut state.subjects_by_watcher, watcher_id, subject_id);
        removed
    }

    fn detach(map: &mut HashMap<String, HashSet<String>>, key: &str, value: &str) -> bool {
        match map.get_mut(key) {
            Some(set) => {
                let removed = set.remove(value);
                if set.is_empty() {
                    map.remove(key);
                }
                removed
            }
            None => false,
        }
    }

    /// Subjects a watcher is subscribed to
    pub async fn subjects_of(&self, watcher_id: &str) -> HashSet<String> {
        let state = self.state.read().await;
        state
            .subjects_by_watcher
            .get(watcher_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Watchers subscribed to a subject
    pub async fn watchers_of(&self, subject_id: &str) -> HashSet<String> {
        let state = self.state.read().await;
        state
            .watchers_by_subject
            .get(subject_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn watcher_count(&self, subject_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .watchers_by_subject
            .get(subject_id)
            .map(|watchers| watchers.len())
            .unwrap_or(0)
    }

    /// Drop every subscription held by a watcher, returning the subjects it
    /// was watching. Used by disconnect cleanup; leaves no empty sets behind.
    pub async fn clear_all_for_watcher(&self, watcher_id: &str) -> Vec<String> {
        let mut state = self.state.write().await;
        let subjects: Vec<String> = match state.subjects_by_watcher.remove(watcher_id) {
            Some(subjects) => subjects.into_iter().collect(),
            None => return Vec::new(),
        };
        for subject_id in &subjects {
            Self::detach(&mut state.watchers_by_subject, subject_id, watcher_id);
        }
        subjects
    }

    /// Drop every subscription targeting a subject, returning the watchers
    /// that were watching it.
    pub async fn clear_all_for_subject(&self, subject_id: &str) -> Vec<String> {
        let mut state = self.state.write().await;
        let watchers: Vec<String> = match state.watchers_by_subject.remove(subject_id) {
            Some(watchers) => watchers.into_iter().collect(),
            None => return Vec::new(),
        };
        for watcher_id in &watchers {
            Self::detach(&mut state.subjects_by_watcher, watcher_id, subject_id);
        }
        watchers
    }

    pub async fn stats(&self) -> TrackingStats {
        let state = self.state.read().await;
        TrackingStats {
            tracked_subjects: state.watchers_by_subject.len(),
            active_watchers: state.subjects_by_watcher.len(),
            subscription_links: state
                .watchers_by_subject
                .values()
                .map(|watchers| watchers.len())
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_requires_minimum_role() {
        let index = SubscriptionIndex::new(Role::Police);

        let denied = index.subscribe("v1", Role::Volunteer, "r1").await;
        assert!(matches!(denied, Err(RideRelayError::PermissionDenied(_))));
        assert!(index.watchers_of("r1").await.is_empty());

        assert!(index.subscribe("p1", Role::Police, "r1").await.unwrap());
        assert!(index
            .subscribe("a1", Role::SuperAdmin, "r1")
            .await
            .unwrap());
        assert_eq!(index.watcher_count("r1").await, 2);
    }

    #[tokio::test]
    async fn test_resubscribe_is_idempotent() {
        let index = SubscriptionIndex::new(Role::Police);
        assert!(index.subscribe("p1", Role::Police, "r1").await.unwrap());
        assert!(!index.subscribe("p1", Role::Police, "r1").await.unwrap());

        assert_eq!(index.watcher_count("r1").await, 1);
        assert_eq!(index.subjects_of("p1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_absent_edge_is_noop() {
        let index = SubscriptionIndex::new(Role::Police);
        assert!(!index.unsubscribe("p1", "r1").await);

        index.subscribe("p1", Role::Police, "r1").await.unwrap();
        assert!(index.unsubscribe("p1", "r1").await);
        assert!(!index.unsubscribe("p1", "r1").await);

        // Empty sets must not linger
        let state = index.state.read().await;
        assert!(state.watchers_by_subject.is_empty());
        assert!(state.subjects_by_watcher.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_unwinds_both_directions() {
        let index = SubscriptionIndex::new(Role::Police);
        index.subscribe("p1", Role::Police, "r1").await.unwrap();
        index.subscribe("p1", Role::Police, "r2").await.unwrap();
        index.subscribe("p2", Role::Police, "r1").await.unwrap();

        let mut subjects = index.clear_all_for_watcher("p1").await;
        subjects.sort();
        assert_eq!(subjects, vec!["r1".to_string(), "r2".to_string()]);
        assert!(index.subjects_of("p1").await.is_empty());
        assert_eq!(index.watchers_of("r1").await.len(), 1);
        assert!(index.watchers_of("r2").await.is_empty());

        let watchers = index.clear_all_for_subject("r1").await;
        assert_eq!(watchers, vec!["p2".to_string()]);
        assert!(index.subjects_of("p2").await.is_empty());

        let stats = index.stats().await;
        assert_eq!(stats.subscription_links, 0);
        assert_eq!(stats.tracked_subjects, 0);
        assert_eq!(stats.active_watchers, 0);
    }

    #[tokio::test]
    async fn test_stats_counts_edges() {
        let index = SubscriptionIndex::new(Role::Police);
        index.subscribe("p1", Role::Police, "r1").await.unwrap();
        index.subscribe("p2", Role::Admin, "r1").await.unwrap();
        index.subscribe("p2", Role::Admin, "r2").await.unwrap();

        let stats = index.stats().await;
        assert_eq!(stats.tracked_subjects, 2);
        assert_eq!(stats.active_watchers, 2);
        assert_eq!(stats.subscription_links, 3);
    }
}
