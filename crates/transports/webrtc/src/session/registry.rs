//! Owned table of live sessions keyed by generated handles

use crate::session::peer_session::PeerSession;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Generated identifier of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session registry
///
/// Passed explicitly to whatever accepts connections; there is no global
/// table. Entries are added on connection accept and removed on close.
pub struct SessionRegistry {
    next_handle: AtomicU64,
    sessions: RwLock<HashMap<SessionHandle, Arc<PeerSession>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a registry. `max_sessions` of 0 means unlimited.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Allocate a fresh handle
    pub fn next_handle(&self) -> SessionHandle {
        SessionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a session under its handle
    ///
    /// Fails when the session limit is reached or the handle is taken.
    pub async fn insert(&self, session: Arc<PeerSession>) -> Result<()> {
        let handle = session.handle();
        let mut sessions = self.sessions.write().await;

        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            return Err(Error::SessionError(format!(
                "Session limit reached ({})",
                self.max_sessions
            )));
        }

        if sessions.contains_key(&handle) {
            return Err(Error::SessionError(format!(
                "Session {} already registered",
                handle
            )));
        }

        sessions.insert(handle, session);
        info!("Registered {} ({} active)", handle, sessions.len());
        Ok(())
    }

    /// Look up a session
    pub async fn get(&self, handle: SessionHandle) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(&handle).cloned()
    }

    /// Remove a session, returning it if it was registered
    pub async fn remove(&self, handle: SessionHandle) -> Option<Arc<PeerSession>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&handle);
        if removed.is_some() {
            info!("Removed {} ({} active)", handle, sessions.len());
        } else {
            debug!("{} was not registered", handle);
        }
        removed
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Handles of all live sessions
    pub async fn handles(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<_> = self.sessions.read().await.keys().copied().collect();
        handles.sort();
        handles
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}
