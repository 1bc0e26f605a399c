//! Error types for the timer core.
//!
//! Infrastructure code (SQLite, settings and cache files) returns
//! `anyhow::Result`; anything crossing the public timer API is mapped onto
//! [`TimerError`] so callers can branch on the failure class.

use thiserror::Error;

use crate::models::SessionId;

/// Failure reported by a [`crate::store::SessionStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store did not answer within the configured timeout.
    #[error("session store timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The referenced session does not exist or is already closed.
    #[error("session {0} not found or already closed")]
    NotFound(SessionId),

    /// A second open session was rejected for the same user.
    #[error("user {user_id} already has an open session")]
    OpenSessionExists { user_id: String },

    /// Any other backend failure (network, SQLite, serialization).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum TimerError {
    /// No owner id is available for the session rows.
    #[error("not authenticated: sign in to track study time")]
    NotAuthenticated,

    /// The store refused or failed to create the new session; the
    /// transition was aborted.
    #[error("failed to create timer session: {0}")]
    SessionCreateFailed(#[source] StoreError),

    /// Closing a session failed; the close is retried in the background.
    #[error("failed to close timer session {session_id}: {source}")]
    SessionCloseFailed {
        session_id: SessionId,
        #[source]
        source: StoreError,
    },

    /// Another transition holds the transition lock.
    #[error("another timer transition is in progress")]
    TransitionInProgress,

    /// The wall clock moved backwards across a session boundary.
    #[error("clock moved backwards by {skew_ms}ms")]
    ClockSkew { skew_ms: i64 },
}

impl TimerError {
    /// Short message suitable for a toast.
    pub fn user_message(&self) -> &'static str {
        match self {
            TimerError::NotAuthenticated => "Sign in to track your study time",
            TimerError::SessionCreateFailed(_) => {
                "Could not save your study time right now. Please try again."
            }
            TimerError::SessionCloseFailed { .. } => {
                "Your last session could not be saved. It will be kept and retried."
            }
            TimerError::TransitionInProgress => "Timer is busy, please try again",
            TimerError::ClockSkew { .. } => "Device clock changed during the session",
        }
    }
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
