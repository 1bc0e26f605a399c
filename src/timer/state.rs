use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::clamped_duration_ms;
use crate::models::{SessionId, SessionKind};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Studying,
    Break,
}

impl Phase {
    pub fn for_kind(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Study => Phase::Studying,
            SessionKind::Break => Phase::Break,
        }
    }

    /// Session kind recorded while in this phase; `None` when idle.
    pub fn kind(self) -> Option<SessionKind> {
        match self {
            Phase::Idle => None,
            Phase::Studying => Some(SessionKind::Study),
            Phase::Break => Some(SessionKind::Break),
        }
    }

    pub fn is_idle(self) -> bool {
        self == Phase::Idle
    }
}

/// The open session the timer is currently measuring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
}

/// In-memory timer state. Written only by the controller.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    phase: Phase,
    active: Option<ActiveSession>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Wall-clock start of the current phase.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|active| active.started_at)
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// Elapsed time of the current phase, recomputed from the anchor.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.anchor() {
            Some(anchor) => clamped_duration_ms(anchor, now),
            None => 0,
        }
    }

    /// Enter the phase for `session.kind`, anchored at the persisted start.
    pub fn begin(&mut self, session: ActiveSession) {
        self.phase = Phase::for_kind(session.kind);
        self.active = Some(session);
    }

    /// Return to idle, handing back the session that was open.
    pub fn finish(&mut self) -> Option<ActiveSession> {
        self.phase = Phase::Idle;
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session(kind: SessionKind) -> ActiveSession {
        ActiveSession {
            session_id: SessionId::from("s1"),
            kind,
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn starts_idle_without_anchor() {
        let state = TimerState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.anchor().is_none());
        assert_eq!(state.elapsed_ms(Utc::now()), 0);
    }

    #[test]
    fn begin_and_finish_round_trip() {
        let mut state = TimerState::new();
        let open = session(SessionKind::Break);
        state.begin(open.clone());
        assert_eq!(state.phase(), Phase::Break);
        assert_eq!(state.anchor(), Some(open.started_at));

        let closed = state.finish();
        assert_eq!(closed, Some(open));
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.anchor().is_none());
        assert!(state.finish().is_none());
    }

    #[test]
    fn elapsed_is_measured_from_anchor() {
        let mut state = TimerState::new();
        let open = session(SessionKind::Study);
        let start = open.started_at;
        state.begin(open);

        assert_eq!(state.elapsed_ms(start + Duration::milliseconds(60_000)), 60_000);
        assert_eq!(state.elapsed_ms(start - Duration::milliseconds(10)), 0);
    }

    #[test]
    fn phase_kind_mapping() {
        assert_eq!(Phase::for_kind(SessionKind::Study), Phase::Studying);
        assert_eq!(Phase::Break.kind(), Some(SessionKind::Break));
        assert_eq!(Phase::Idle.kind(), None);
    }
}
