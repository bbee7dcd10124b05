//! Registry of live download sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::request::DownloadRequest;
use crate::session::{DownloadSession, SessionId};

/// Tracks live sessions by id so they can be listed and cancelled together.
///
/// Purely in memory. Sessions are removed with [`forget`](Self::forget) once
/// their outcome has been handled.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, DownloadSession>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a pending session for `request` and register it.
    pub async fn create(&self, request: DownloadRequest) -> DownloadSession {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = DownloadSession::new(id, request);
        self.register(session.clone()).await;
        session
    }

    /// Register an existing session, replacing any session with the same id.
    pub async fn register(&self, session: DownloadSession) {
        let id = session.id();
        let mut sessions = self.sessions.write().await;
        if sessions.insert(id, session).is_some() {
            debug!(session = id, "Replaced registered session");
        }
        debug!(session = id, live = sessions.len(), "Session registered");
    }

    /// Remove a session, returning it if it was registered.
    pub async fn forget(&self, id: SessionId) -> Option<DownloadSession> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            debug!(session = id, "Session forgotten");
        }
        removed
    }

    /// Look up a session.
    pub async fn get(&self, id: SessionId) -> Option<DownloadSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Cancel one session. Returns `false` if it is unknown or already finished.
    pub async fn cancel(&self, id: SessionId) -> bool {
        match self.get(id).await {
            Some(session) => session.cancel(),
            None => {
                debug!(session = id, "Cancel requested for unknown session");
                false
            }
        }
    }

    /// Cancel every registered session. Returns how many were affected.
    pub async fn cancel_all(&self) -> usize {
        let sessions: Vec<DownloadSession> = self.sessions.read().await.values().cloned().collect();
        let cancelled = sessions.iter().filter(|session| session.cancel()).count();
        info!(cancelled, total = sessions.len(), "Cancelled all sessions");
        cancelled
    }

    /// Ids of registered sessions, ascending.
    pub async fn active_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
