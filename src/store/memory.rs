use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{SessionId, SessionKind, TimerSession};

use super::SessionStore;

/// Process-local session store. Enforces the same one-open-session-per-user
/// rule as the SQLite schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<Vec<TimerSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, in insertion order.
    pub fn sessions(&self) -> Vec<TimerSession> {
        self.lock().clone()
    }

    /// Insert a row as-is, bypassing the open-session check.
    pub fn insert_raw(&self, session: TimerSession) {
        self.lock().push(session);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TimerSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StoreError> {
        let mut sessions = self.lock();
        if sessions.iter().any(|s| s.user_id == user_id && s.is_open()) {
            return Err(StoreError::OpenSessionExists {
                user_id: user_id.to_string(),
            });
        }

        let id = SessionId(Uuid::new_v4().to_string());
        sessions.push(TimerSession {
            id: id.clone(),
            user_id: user_id.to_string(),
            kind,
            started_at,
            ended_at: None,
            duration_ms: 0,
        });
        Ok(id)
    }

    async fn close_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        let mut sessions = self.lock();
        let session = sessions
            .iter_mut()
            .find(|s| &s.id == session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.clone()))?;

        match session.ended_at {
            None => {
                session.ended_at = Some(ended_at);
                session.duration_ms = duration_ms;
                Ok(())
            }
            Some(existing) if existing == ended_at && session.duration_ms == duration_ms => Ok(()),
            Some(_) => Err(StoreError::NotFound(session_id.clone())),
        }
    }

    async fn sum_durations(&self, user_id: &str, kind: SessionKind) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|s| s.user_id == user_id && s.kind == kind && !s.is_open())
            .map(|s| s.duration_ms)
            .sum())
    }

    async fn open_sessions(&self, user_id: &str) -> Result<Vec<TimerSession>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|s| s.user_id == user_id && s.is_open())
            .cloned()
            .collect())
    }

    async fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TimerSession>, StoreError> {
        let mut rows: Vec<TimerSession> = self
            .lock()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
