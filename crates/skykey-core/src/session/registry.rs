//! Session registry - owns every live chained session.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skykey_traits::{Clock, CredentialError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{ChainedSession, RefreshState, SessionInfo};

/// Session counts by refresh state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub idle: usize,
    pub refreshing: usize,
    pub degraded: usize,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<ChainedSession>>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn register(&self, session: ChainedSession) -> Arc<ChainedSession> {
        let session = Arc::new(session);
        self.sessions
            .lock()
            .insert(session.id().to_string(), session.clone());
        info!(
            session_id = %session.id(),
            provider = %session.seed_provider(),
            steps = session.steps().len(),
            "Registered chained session"
        );
        session
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &str) -> Result<Arc<ChainedSession>> {
        let session = self
            .sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CredentialError::SessionNotFound(id.to_string()))?;
        session.touch(self.clock.now());
        Ok(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Remove a session; it is no longer refreshed.
    pub fn close(&self, id: &str) -> Result<()> {
        match self.sessions.lock().remove(id) {
            Some(_) => {
                info!(session_id = %id, "Closed chained session");
                Ok(())
            }
            None => Err(CredentialError::SessionNotFound(id.to_string())),
        }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.snapshot().iter().map(|session| session.info()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for session in self.snapshot() {
            summary.total += 1;
            match session.refresh_state() {
                RefreshState::Idle => summary.idle += 1,
                RefreshState::Refreshing => summary.refreshing += 1,
                RefreshState::Degraded => summary.degraded += 1,
            }
        }
        summary
    }

    /// Drop every session, returning how many were released.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        debug!(count = drained.len(), "Cleared session registry");
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Current sessions, without holding the registry lock afterwards.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ChainedSession>> {
        self.sessions.lock().values().cloned().collect()
    }
}
