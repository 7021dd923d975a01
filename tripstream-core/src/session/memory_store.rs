use super::store::{ExpiryPolicy, SessionStore, StreamingSession};
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Process-local session storage; nothing survives a restart
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StreamingSession>>,
    expiry: ExpiryPolicy,
}

impl MemorySessionStore {
    pub fn new(expiry: ExpiryPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            expiry,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, session_id: &str) -> Result<Option<StreamingSession>> {
        let mut sessions = self.sessions.lock();
        let expired = sessions
            .get(session_id)
            .is_some_and(|session| self.expiry.is_expired(session));
        if expired {
            warn!(%session_id, "purging expired session");
            sessions.remove(session_id);
            return Ok(None);
        }
        Ok(sessions.get(session_id).cloned())
    }

    fn save(&self, session: &StreamingSession) -> Result<()> {
        self.sessions
            .lock()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.lock().remove(session_id).is_some())
    }

    fn clear(&self) -> Result<usize> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.len();
        sessions.clear();
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<StreamingSession>> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| !self.expiry.is_expired(session));

        let mut live: Vec<_> = sessions.values().cloned().collect();
        live.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(live)
    }
}
