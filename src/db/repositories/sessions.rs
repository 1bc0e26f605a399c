use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_kind, parse_optional_datetime, to_i64, to_u64},
};
use crate::error::StoreError;
use crate::models::{SessionId, SessionKind, TimerSession};
use crate::store::SessionStore;

const SESSION_COLUMNS: &str = "id, user_id, kind, started_at, ended_at, duration_ms";

fn row_to_session(row: &Row) -> Result<TimerSession> {
    let kind: String = row.get("kind")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let duration_ms: i64 = row.get("duration_ms")?;

    Ok(TimerSession {
        id: SessionId(row.get("id")?),
        user_id: row.get("user_id")?,
        kind: parse_kind(&kind)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        duration_ms: to_u64(duration_ms, "duration_ms")?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Insert an open session. Returns `None` when the user already has one.
    pub async fn insert_open_session(
        &self,
        user_id: &str,
        kind: SessionKind,
        started_at: DateTime<Utc>,
    ) -> Result<Option<SessionId>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let id = Uuid::new_v4().to_string();
            let started = format_datetime(&started_at);
            let inserted = conn.execute(
                "INSERT INTO timer_sessions (id, user_id, kind, started_at, ended_at, duration_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5)",
                params![id, user_id, kind.as_str(), started, format_datetime(&Utc::now())],
            );

            match inserted {
                Ok(_) => Ok(Some(SessionId(id))),
                Err(err) if is_constraint_violation(&err) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    /// Close an open session. Returns `false` if no matching open row exists
    /// and the row is not already closed with identical values.
    pub async fn finalize_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<bool> {
        let session_id = session_id.0.clone();
        self.execute(move |conn| {
            let ended = format_datetime(&ended_at);
            let duration = to_i64(duration_ms)?;
            let rows_affected = conn.execute(
                "UPDATE timer_sessions
                 SET ended_at = ?1,
                     duration_ms = ?2
                 WHERE id = ?3
                   AND (ended_at IS NULL OR (ended_at = ?1 AND duration_ms = ?2))",
                params![ended, duration, session_id],
            )?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn total_duration(&self, user_id: &str, kind: SessionKind) -> Result<u64> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(duration_ms), 0)
                 FROM timer_sessions
                 WHERE user_id = ?1 AND kind = ?2 AND ended_at IS NOT NULL",
                params![user_id, kind.as_str()],
                |row| row.get(0),
            )?;
            to_u64(total, "duration_ms")
        })
        .await
    }

    pub async fn get_open_sessions(&self, user_id: &str) -> Result<Vec<TimerSession>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM timer_sessions
                 WHERE user_id = ?1 AND ended_at IS NULL
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query(params![user_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn list_sessions_paginated(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TimerSession>> {
        let user_id = user_id.to_string();
        let limit = limit as i64;
        let offset = offset as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM timer_sessions
                 WHERE user_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;

            let mut rows = stmt.query(params![user_id, limit, offset])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StoreError> {
        self.insert_open_session(user_id, kind, started_at)
            .await?
            .ok_or_else(|| StoreError::OpenSessionExists {
                user_id: user_id.to_string(),
            })
    }

    async fn close_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        if self.finalize_session(session_id, ended_at, duration_ms).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(session_id.clone()))
        }
    }

    async fn sum_durations(&self, user_id: &str, kind: SessionKind) -> Result<u64, StoreError> {
        Ok(self.total_duration(user_id, kind).await?)
    }

    async fn open_sessions(&self, user_id: &str) -> Result<Vec<TimerSession>, StoreError> {
        Ok(self.get_open_sessions(user_id).await?)
    }

    async fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TimerSession>, StoreError> {
        Ok(self.list_sessions_paginated(user_id, limit, 0).await?)
    }
}
