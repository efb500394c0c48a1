//! Generic per-key auto-expiry state machine
//!
//! Each key is either absent or active with a deadline and a scheduled timer.
//! Starting an active key replaces its timer (the old handle is aborted and
//! its generation invalidated before the new one is armed); stopping removes
//! the entry and aborts the timer. A timer validates its generation under the
//! entry lock before taking effect, so a cancelled or superseded timer can
//! never fire an expiry even if the abort races the wakeup. Expired keys are
//! delivered to the owner through an unbounded channel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Keyed state for a live typing indicator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingKey {
    pub conversation_id: String,
    pub user_id: String,
}

/// Typing-indicator domain of the tracker
pub type TypingTracker = ExpiryTracker<TypingKey>;

struct Entry {
    generation: u64,
    deadline: Instant,
    timer: JoinHandle<()>,
}

struct TrackerState<K> {
    entries: HashMap<K, Entry>,
    next_generation: u64,
}

pub struct ExpiryTracker<K> {
    state: Arc<Mutex<TrackerState<K>>>,
    timeout: Duration,
    expired_tx: mpsc::UnboundedSender<K>,
}

impl<K> ExpiryTracker<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create a tracker and the channel its expirations are delivered on
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<K>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let tracker = Self {
            state: Arc::new(Mutex::new(TrackerState {
                entries: HashMap::new(),
                next_generation: 0,
            })),
            timeout,
            expired_tx,
        };
        (tracker, expired_rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule the key, or reschedule it if already active.
    /// The previous timer, if any, is cancelled first.
    pub fn start(&self, key: K) {
        let mut state = self.lock();
        let generation = state.next_generation;
        state.next_generation += 1;

        if let Some(previous) = state.entries.remove(&key) {
            previous.timer.abort();
        }

        let state_ref = Arc::clone(&self.state);
        let expired_tx = self.expired_tx.clone();
        let timer_key = key.clone();
        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let fired = {
                let mut state = state_ref.lock().unwrap_or_else(PoisonError::into_inner);
                match state.entries.get(&timer_key) {
                    Some(entry) if entry.generation == generation => {
                        state.entries.remove(&timer_key);
                        true
                    }
                    // Superseded or already cleared; this handle is dead
                    _ => false,
                }
            };
            if fired {
                let _ = expired_tx.send(timer_key);
            }
        });

        state.entries.insert(
            key,
            Entry {
                generation,
                deadline: Instant::now() + timeout,
                timer,
            },
        );
    }

    /// Cancel the key if active; no-op if absent. Cancellation is definitive:
    /// the removed generation can never fire afterwards.
    pub fn stop(&self, key: &K) -> bool {
        let mut state = self.lock();
        match state.entries.remove(key) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Stop every active key matching the predicate, returning the cleared
    /// keys. Used on disconnect to unwind one owner's entries.
    pub fn clear_matching<F>(&self, predicate: F) -> Vec<K>
    where
        F: Fn(&K) -> bool,
    {
        let mut state = self.lock();
        let matching: Vec<K> = state
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &matching {
            if let Some(entry) = state.entries.remove(key) {
                entry.timer.abort();
            }
        }
        matching
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Remaining time before the key expires, if it is active
    pub fn deadline(&self, key: &K) -> Option<Duration> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }
}
