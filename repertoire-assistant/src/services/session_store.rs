//! In-memory conversations keyed by session id, with idle eviction.

use crate::models::Conversation;
use crate::services::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A stored conversation and when it was last touched.
pub struct SessionSlot {
    conversation: Arc<Mutex<Conversation>>,
    last_seen: StdMutex<Instant>,
}

impl SessionSlot {
    fn new(session_id: Uuid, now: Instant) -> Self {
        Self {
            conversation: Arc::new(Mutex::new(Conversation::new(session_id))),
            last_seen: StdMutex::new(now),
        }
    }

    fn touch(&self, now: Instant) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = now;
        }
    }

    fn idle_since(&self) -> Instant {
        self.last_seen
            .lock()
            .map(|last_seen| *last_seen)
            .unwrap_or_else(|e| *e.into_inner())
    }

    /// Lock the conversation for the length of one interaction.
    pub async fn lock(&self) -> OwnedMutexGuard<Conversation> {
        self.conversation.clone().lock_owned().await
    }
}

/// Session id to conversation map.
///
/// Each conversation sits behind its own async mutex, so turns in one session
/// run one at a time while other sessions proceed independently.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<SessionSlot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Return the slot for `session_id`, creating a fresh conversation when
    /// the id is absent or unknown. The returned id is the one in use.
    pub fn resolve(&self, session_id: Option<Uuid>) -> (Uuid, Arc<SessionSlot>) {
        let now = Instant::now();
        if let Some(id) = session_id {
            if let Some(slot) = self.sessions.get(&id) {
                slot.touch(now);
                return (id, slot.clone());
            }
        }

        let id = Uuid::new_v4();
        let slot = Arc::new(SessionSlot::new(id, now));
        self.sessions.insert(id, slot.clone());
        metrics::set_active_sessions(self.sessions.len());
        tracing::debug!(session_id = %id, "Started new session");
        (id, slot)
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, session_id: &Uuid) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            metrics::set_active_sessions(self.sessions.len());
            tracing::info!(session_id = %session_id, "Session reset");
        }
        removed
    }

    /// Evict sessions idle for longer than the TTL as of `now`.
    ///
    /// Sessions with a turn in flight are kept regardless of age.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            let idle = now.saturating_duration_since(slot.idle_since());
            idle <= self.ttl || slot.conversation.try_lock().is_err()
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            metrics::set_active_sessions(self.sessions.len());
            tracing::info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run [`SessionStore::evict_idle_at`] every `interval` in the background.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_idle_at(Instant::now());
            }
        })
    }
}
