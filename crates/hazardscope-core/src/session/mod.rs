//! Session store bridging the two phases of the query workflow
//!
//! An injectable in-memory store with TTL expiry and atomic per-key
//! read-modify-write. All mutation goes through [`SessionStore::update`];
//! nothing outside the store touches session fields directly. Expiry is
//! checked logically on every read, in addition to the background sweep.

use crate::config::SessionConfig;
use crate::error::{HazardScopeError, Result};
use crate::ids::generate_id;
use crate::llm::ImageInput;
use crate::rerank::RerankedResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Session lifecycle states.
///
/// `Pending → Analyzed → Completed`; `Expired` is reachable from any
/// non-terminal state once the TTL elapses. `Completed` and `Expired` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Analyzed,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Expired)
    }
}

/// Server-held state between `analyze_image` and `complete_answer`
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub query_text: Option<String>,
    pub image: Option<ImageInput>,
    pub visual_analysis: Option<String>,
    pub evidence: Option<RerankedResult>,
    pub status: SessionStatus,
    pub ttl_secs: u64,
    /// Bumped on every applied update; doubles as a write counter
    pub revision: u64,
}

struct SessionEntry {
    session: Session,
    expires_at: Instant,
}

/// In-memory session store with TTL
///
/// Id uniqueness is the caller's responsibility: `create` on an existing id
/// overwrites it (last-write-wins).
pub struct SessionStore {
    ttl: Duration,
    inner: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session under the given id, overwriting any previous entry
    pub async fn create(&self, session_id: &str) -> Session {
        let session = Session {
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            query_text: None,
            image: None,
            visual_analysis: None,
            evidence: None,
            status: SessionStatus::Pending,
            ttl_secs: self.ttl.as_secs(),
            revision: 0,
        };

        let mut inner = self.inner.write().await;
        inner.insert(
            session_id.to_string(),
            SessionEntry {
                session: session.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        tracing::debug!(session_id, ttl_secs = self.ttl.as_secs(), "session created");
        session
    }

    /// Create a session under a freshly generated id
    pub async fn create_with_generated_id(&self) -> Session {
        let id = generate_id();
        self.create(&id).await
    }

    /// Fetch a session. Missing or TTL-elapsed entries both surface as
    /// `SessionExpired`; stale evidence is never returned.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        let inner = self.inner.read().await;
        let entry = inner
            .get(session_id)
            .ok_or_else(|| HazardScopeError::SessionExpired(session_id.to_string()))?;

        if entry.expires_at <= Instant::now() {
            return Err(HazardScopeError::SessionExpired(session_id.to_string()));
        }

        Ok(entry.session.clone())
    }

    /// Apply a mutation atomically under per-session exclusivity.
    ///
    /// The mutator runs as one read-modify-write while the store lock is
    /// held, so concurrent updates never interleave partial mutations.
    /// Terminal sessions reject updates.
    pub async fn update<F>(&self, session_id: &str, mutator: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut inner = self.inner.write().await;
        let entry = inner
            .get_mut(session_id)
            .ok_or_else(|| HazardScopeError::SessionExpired(session_id.to_string()))?;

        if entry.expires_at <= Instant::now() {
            entry.session.status = SessionStatus::Expired;
            return Err(HazardScopeError::SessionExpired(session_id.to_string()));
        }

        if entry.session.status.is_terminal() {
            return Err(HazardScopeError::InvalidInput(format!(
                "session {} is in terminal state {:?}",
                session_id, entry.session.status
            )));
        }

        mutator(&mut entry.session);
        entry.session.revision += 1;

        Ok(entry.session.clone())
    }

    /// Drop every entry whose TTL has elapsed; returns how many were removed
    pub async fn expire_sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, entry| entry.expires_at > now);
        let removed = before - inner.len();

        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
        removed
    }

    /// Number of live (not yet swept) entries
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Periodic expiry sweep; spawn with `tokio::spawn` and keep the handle
pub async fn run_sweeper(store: Arc<SessionStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        store.expire_sweep().await;
    }
}
