//! Conversation context: per-session turn history for follow-up queries
//!
//! Each session gets its own `tokio::sync::Mutex`, so turns for the same
//! session serialize while different sessions never contend. Sessions live in
//! an LRU cache capped by `max_sessions` and are swept after `ttl` of idleness.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ContextError;
use crate::types::{Classification, Entity, IntentKind, Query, ResponderResult, SlotKind};

/// Configuration for the context store
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Turns kept per session
    pub history_size: usize,
    /// Idle time after which a session is dropped
    pub ttl: Duration,
    pub max_sessions: usize,
    /// How long a turn waits for its session before giving up
    pub lock_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_size: 5,
            ttl: Duration::from_secs(30 * 60),
            max_sessions: 1000,
            lock_timeout: Duration::from_millis(500),
        }
    }
}

/// What one completed turn left behind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub query_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub intents: Vec<IntentKind>,
    pub entities: Vec<Entity>,
}

/// Per-session state consulted by follow-up turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Oldest first, bounded by `history_size`
    pub turns: VecDeque<TurnRecord>,
    pub last_results: Vec<ResponderResult>,
    pub turn_count: u64,
    history_size: usize,
}

impl ConversationContext {
    pub fn new(session_id: &str, history_size: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            last_activity: now,
            turns: VecDeque::with_capacity(history_size),
            last_results: Vec::new(),
            turn_count: 0,
            history_size: history_size.max(1),
        }
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.turns.back()
    }

    /// Most recent non-negated entity of `slot`, newest turn first
    pub fn latest_entity(&self, slot: SlotKind) -> Option<&Entity> {
        self.turns
            .iter()
            .rev()
            .flat_map(|turn| turn.entities.iter().rev())
            .find(|e| e.slot == slot && !e.is_negated())
    }

    /// The first answered intent of the previous turn
    pub fn last_topic(&self) -> Option<IntentKind> {
        self.last_turn()?
            .intents
            .iter()
            .copied()
            .find(|kind| IntentKind::DETECTABLE.contains(kind))
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_activity);
        idle.to_std().map(|idle| idle > ttl).unwrap_or(false)
    }

    /// Append a completed turn. Entities carried forward into the
    /// classification are kept too, so a chain of follow-ups still resolves.
    pub fn record_turn(
        &mut self,
        query: &Query,
        classification: &Classification,
        entities: &[Entity],
        results: &[ResponderResult],
    ) {
        let mut kept: Vec<Entity> = entities.to_vec();
        for entity in classification.intents.iter().flat_map(|i| &i.entities) {
            if !kept.iter().any(|e| e.slot == entity.slot && e.value == entity.value) {
                kept.push(entity.clone());
            }
        }

        if self.turns.len() >= self.history_size {
            self.turns.pop_front();
        }
        self.turns.push_back(TurnRecord {
            query_id: query.id.clone(),
            text: query.text.clone(),
            timestamp: query.timestamp,
            intents: classification.kinds(),
            entities: kept,
        });
        self.last_results = results.to_vec();
        self.last_activity = Utc::now();
        self.turn_count += 1;
    }
}

/// Exclusive access to one session's context for the length of a turn
pub struct SessionGuard {
    guard: OwnedMutexGuard<ConversationContext>,
}

impl Deref for SessionGuard {
    type Target = ConversationContext;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Process-scoped store of conversation contexts
pub struct ContextStore {
    sessions: Mutex<LruCache<String, Arc<Mutex<ConversationContext>>>>,
    config: ContextConfig,
}

impl ContextStore {
    pub fn new(config: ContextConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Context for a fresh session, not stored
    pub fn fresh(&self, session_id: &str) -> ConversationContext {
        ConversationContext::new(session_id, self.config.history_size)
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<ConversationContext>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get(session_id) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(Mutex::new(self.fresh(session_id)));
        if let Some((evicted, _)) = sessions.push(session_id.to_string(), Arc::clone(&entry)) {
            if evicted != session_id {
                debug!("Evicted least recently used session '{}'", evicted);
            }
        }
        debug!("Created context for session '{}'", session_id);
        entry
    }

    /// Lock a session for a turn, creating it on first use.
    ///
    /// Waits at most `lock_timeout` for a turn already holding the session.
    /// An expired context is reset before it is handed out.
    pub async fn acquire(&self, session_id: &str) -> Result<SessionGuard, ContextError> {
        let entry = self.entry(session_id).await;
        let mut guard = tokio::time::timeout(self.config.lock_timeout, entry.lock_owned())
            .await
            .map_err(|_| ContextError::Unavailable {
                session_id: session_id.to_string(),
                reason: format!(
                    "session busy for more than {}ms",
                    self.config.lock_timeout.as_millis()
                ),
            })?;

        if guard.turn_count > 0 && guard.is_expired(self.config.ttl, Utc::now()) {
            info!("Session '{}' expired, starting fresh", session_id);
            *guard = self.fresh(session_id);
        }
        Ok(SessionGuard { guard })
    }

    /// Copy of a session's context, or a fresh one if it does not exist
    pub async fn get(&self, session_id: &str) -> Result<ConversationContext, ContextError> {
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.get(session_id).map(Arc::clone)
        };
        let Some(entry) = entry else {
            return Ok(self.fresh(session_id));
        };
        let guard = tokio::time::timeout(self.config.lock_timeout, entry.lock())
            .await
            .map_err(|_| ContextError::Unavailable {
                session_id: session_id.to_string(),
                reason: "session busy".to_string(),
            })?;
        if guard.is_expired(self.config.ttl, Utc::now()) {
            return Ok(self.fresh(session_id));
        }
        Ok((*guard).clone())
    }

    /// Record a completed turn outside of `acquire`
    pub async fn update(
        &self,
        query: &Query,
        classification: &Classification,
        entities: &[Entity],
        results: &[ResponderResult],
    ) -> Result<(), ContextError> {
        let mut session = self.acquire(&query.session_id).await?;
        session.record_turn(query, classification, entities, results);
        Ok(())
    }

    /// End a session. Returns whether it existed.
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.pop(session_id).is_some();
        if removed {
            info!("Closed session '{}'", session_id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains(session_id)
    }

    /// Drop sessions idle for longer than `ttl`
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`. Sessions in the middle of a
    /// turn are skipped.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                entry
                    .try_lock()
                    .map(|ctx| ctx.is_expired(self.config.ttl, now))
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.pop(id);
        }
        if !expired.is_empty() {
            info!("Swept {} expired session(s)", expired.len());
        }
        expired.len()
    }

    /// Run `sweep` every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Context sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}
