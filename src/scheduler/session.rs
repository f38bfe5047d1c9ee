//! Pending overwrite session store
//!
//! Conflicting batch rows wait here until a confirmation call applies them or
//! the TTL runs out. Sessions are in-memory only. Expired sessions leave a
//! tombstone for one more TTL so a late confirmation still reports
//! `SessionExpired` instead of `SessionNotFound`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use crate::clock::Clock;
use crate::metrics;
use crate::models::{OverwriteProposal, PendingOverwriteSession};

#[derive(Debug, Default)]
struct Sessions {
    live: HashMap<Uuid, PendingOverwriteSession>,
    /// Expired session id -> expiry instant
    tombstones: HashMap<Uuid, DateTime<Utc>>,
}

/// TTL-bounded store of pending overwrite sessions
pub struct SessionStore {
    sessions: RwLock<Sessions>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a session holding `overwrites`
    pub async fn create(&self, overwrites: Vec<OverwriteProposal>) -> PendingOverwriteSession {
        let session = PendingOverwriteSession::new(self.clock.now(), overwrites);
        let pending = {
            let mut sessions = self.sessions.write().await;
            sessions.live.insert(session.id, session.clone());
            sessions.live.len()
        };

        metrics::record_session_created(pending);
        info!(
            session_id = %session.id,
            overwrites = session.overwrites.len(),
            expires_at = %session.expires_at(self.ttl).to_rfc3339(),
            "Pending overwrite session created"
        );
        session
    }

    /// Look at a live, unexpired session without consuming it
    pub async fn get(&self, id: Uuid) -> Option<PendingOverwriteSession> {
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        sessions
            .live
            .get(&id)
            .filter(|s| !s.is_expired(self.ttl, now))
            .cloned()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.get(id).await.is_some()
    }

    /// Number of sessions not yet swept
    pub async fn len(&self) -> usize {
        self.sessions.read().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove and return a session for confirmation
    ///
    /// An expired session is reported as `SessionExpired`, also when the
    /// sweep got to it first and on every retry until its tombstone is purged.
    pub async fn take(&self, id: Uuid) -> SchedulerResult<PendingOverwriteSession> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;

        if let Some(expired_at) = sessions.tombstones.get(&id) {
            return Err(SchedulerError::SessionExpired {
                session_id: id,
                expired_at: *expired_at,
            });
        }

        let session = sessions
            .live
            .remove(&id)
            .ok_or(SchedulerError::SessionNotFound { session_id: id })?;

        if session.is_expired(self.ttl, now) {
            let expired_at = session.expires_at(self.ttl);
            sessions.tombstones.insert(id, expired_at);
            return Err(SchedulerError::SessionExpired {
                session_id: id,
                expired_at,
            });
        }

        Ok(session)
    }

    /// Drop expired sessions, returning how many were removed
    ///
    /// Tombstones older than one TTL are purged in the same pass.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut sessions = self.sessions.write().await;

        let expired: Vec<(Uuid, DateTime<Utc>)> = sessions
            .live
            .values()
            .filter(|s| s.is_expired(ttl, now))
            .map(|s| (s.id, s.expires_at(ttl)))
            .collect();

        for (id, expired_at) in &expired {
            sessions.live.remove(id);
            sessions.tombstones.insert(*id, *expired_at);
        }

        sessions
            .tombstones
            .retain(|_, expired_at| *expired_at + ttl >= now);

        let pending = sessions.live.len();
        drop(sessions);

        if !expired.is_empty() {
            debug!(removed = expired.len(), pending, "Expired overwrite sessions swept");
        }
        metrics::record_sessions_expired(expired.len(), pending);

        expired.len()
    }
}
