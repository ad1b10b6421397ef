//! Owner of every open session in an application.
//!
//! Explicit add/remove; there is no global session list.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use slimtune_core::SessionError;

use crate::coordinator::{CloseReason, Outcome, SessionHandle};

/// Key of a session within a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(u64);

impl SessionKey {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Maps session keys to running sessions.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionKey, SessionHandle>,
    next_key: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a session handle.
    pub fn add(&mut self, handle: SessionHandle) -> SessionKey {
        self.next_key += 1;
        let key = SessionKey(self.next_key);
        self.sessions.insert(key, handle);
        debug!(%key, total = self.sessions.len(), "Session added");
        key
    }

    /// Releases a session handle. The session itself is torn down once no
    /// other clone of the handle remains.
    pub fn remove(&mut self, key: SessionKey) -> Option<SessionHandle> {
        let removed = self.sessions.remove(&key);
        if removed.is_some() {
            debug!(%key, total = self.sessions.len(), "Session removed");
        }
        removed
    }

    pub fn get(&self, key: SessionKey) -> Option<&SessionHandle> {
        self.sessions.get(&key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Closes every session for application shutdown.
    ///
    /// Sessions that closed (or had already stopped) are removed. Returns
    /// the keys of sessions whose close was cancelled and that stay open.
    pub async fn shutdown_all(&mut self) -> Vec<SessionKey> {
        let mut kept = Vec::new();
        for key in self.keys() {
            let Some(handle) = self.sessions.get(&key) else {
                continue;
            };
            match handle.close(CloseReason::Shutdown).await {
                Ok(Outcome::Completed) | Err(SessionError::ChannelClosed) => {
                    self.sessions.remove(&key);
                }
                Ok(Outcome::Cancelled) => kept.push(key),
                Err(e) => {
                    warn!(%key, error = %e, "Session failed to close");
                    kept.push(key);
                }
            }
        }
        info!(remaining = kept.len(), "Session shutdown complete");
        kept
    }
}
