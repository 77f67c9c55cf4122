//! Concurrent map from connection id to session

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::{Role, Session, SessionError, SessionId, SessionResult};
use crate::crypto::CipherSuite;

/// Shared handle to one session; the mutex serializes every step on it
pub type SessionHandle = Arc<Mutex<Session>>;

/// Authoritative record of which connections have which session
///
/// Lookups take the read lock only long enough to clone a handle, so slow work
/// on one session never blocks another.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session in `AWAITING_KEY`
    pub async fn create(
        &self,
        id: SessionId,
        role: Role,
        suite: CipherSuite,
    ) -> SessionResult<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id));
        }

        let handle = Arc::new(Mutex::new(Session::new(id, role, suite)));
        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    /// Look up a session
    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).cloned()
    }

    /// Look up a session, failing with `SessionNotFound`
    pub async fn require(&self, id: SessionId) -> SessionResult<SessionHandle> {
        self.get(id).await.ok_or(SessionError::SessionNotFound(id))
    }

    /// Remove a session and wipe its key material
    ///
    /// Returns false if the id was unknown.
    pub async fn destroy(&self, id: SessionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&id)
        };

        match removed {
            Some(handle) => {
                handle.lock().await.wipe();
                true
            }
            None => false,
        }
    }

    /// Whether a live session has this id
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Ids of all live sessions
    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
