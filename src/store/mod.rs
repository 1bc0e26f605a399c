//! Session store contract consumed by the timer core.
//!
//! The core never talks to a backend directly; every boundary event goes
//! through this trait so hosts can plug in a hosted database client, the
//! bundled SQLite store ([`crate::db::Database`]) or [`MemoryStore`].

mod memory;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{SessionId, SessionKind, TimerSession};

pub use memory::MemoryStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert an open session and return its store-assigned id.
    async fn create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StoreError>;

    /// Set `ended_at` and `duration_ms` on an open session.
    ///
    /// Closing a session that is already closed with the same values must
    /// succeed, so retried writes are harmless.
    async fn close_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<(), StoreError>;

    /// Sum of `duration_ms` over the user's closed sessions of `kind`.
    async fn sum_durations(&self, user_id: &str, kind: SessionKind) -> Result<u64, StoreError>;

    /// Sessions of the user that have no `ended_at`.
    async fn open_sessions(&self, user_id: &str) -> Result<Vec<TimerSession>, StoreError>;

    /// Newest-first listing of the user's sessions.
    async fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TimerSession>, StoreError>;
}

/// Run a store call under `timeout`; an elapsed timer counts as a failure.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?
}
