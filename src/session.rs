//! Per-user session store.
//!
//! A session is the user's current [`ConversationState`] plus the time it was
//! last written. Writes replace the whole session (last writer wins); there is
//! no merge and no compare-and-swap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dialogue::{ConversationState, Step};
use crate::models::ExternalId;

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub user_id: ExternalId,
    pub state: ConversationState,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session at [`ConversationState::Start`]
    pub fn new(user_id: ExternalId) -> Self {
        Self {
            user_id,
            state: ConversationState::Start,
            updated_at: Utc::now(),
        }
    }

    pub fn step(&self) -> Step {
        self.state.step()
    }
}

/// Storage for conversation sessions, injected into the engine
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current session, or a fresh START session when none exists
    async fn get(&self, user_id: ExternalId) -> Session;

    /// Replace the user's session wholesale
    async fn set(&self, user_id: ExternalId, state: ConversationState);

    async fn clear(&self, user_id: ExternalId);
}

/// Process-memory session store.
///
/// Sessions live until overwritten, cleared, evicted by
/// [`evict_idle`](Self::evict_idle), or lost on restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<ExternalId, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions not written for longer than `max_idle`; returns how many went
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.updated_at >= cutoff);
        before.saturating_sub(self.sessions.len())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: ExternalId) -> Session {
        self.sessions
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Session::new(user_id))
    }

    async fn set(&self, user_id: ExternalId, state: ConversationState) {
        debug!(user_id, step = %state.step(), "Session updated");
        self.sessions.insert(
            user_id,
            Session {
                user_id,
                state,
                updated_at: Utc::now(),
            },
        );
    }

    async fn clear(&self, user_id: ExternalId) {
        debug!(user_id, "Session cleared");
        self.sessions.remove(&user_id);
    }
}

/// Periodically evict sessions idle longer than `ttl`
pub fn spawn_idle_sweeper(
    store: Arc<InMemorySessionStore>,
    ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    info!(ttl_secs = ttl.as_secs(), "Session idle eviction enabled");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let evicted = store.evict_idle(ttl);
            if evicted > 0 {
                info!(evicted, remaining = store.len(), "Evicted idle sessions");
            }
        }
    })
}
