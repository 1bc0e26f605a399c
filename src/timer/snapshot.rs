use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::clock::Clock;
use crate::totals::TotalsAccumulator;

use super::{Phase, TimerState};

/// What observers see: the phase, how long it has been running and the
/// lifetime totals (excluding the running phase).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub elapsed_ms: u64,
    pub total_study_ms: u64,
    pub total_break_ms: u64,
}

impl TimerSnapshot {
    /// Study time including the running phase, as a percentage of all
    /// tracked time. Zero when nothing has been tracked.
    pub fn study_share(&self) -> f64 {
        let (study, brk) = match self.phase {
            Phase::Studying => (self.total_study_ms + self.elapsed_ms, self.total_break_ms),
            Phase::Break => (self.total_study_ms, self.total_break_ms + self.elapsed_ms),
            Phase::Idle => (self.total_study_ms, self.total_break_ms),
        };
        let total = study + brk;
        if total == 0 {
            0.0
        } else {
            study as f64 / total as f64 * 100.0
        }
    }
}

/// Single place where snapshots are built and pushed to the watch channel.
///
/// Snapshots are sent while the state lock is held, so a tick sampled just
/// before a stop can never overwrite the idle snapshot that follows it.
#[derive(Clone)]
pub(crate) struct SnapshotPublisher {
    state: Arc<Mutex<TimerState>>,
    clock: Arc<dyn Clock>,
    totals: TotalsAccumulator,
    tx: Arc<watch::Sender<TimerSnapshot>>,
}

impl SnapshotPublisher {
    pub(crate) fn new(
        state: Arc<Mutex<TimerState>>,
        clock: Arc<dyn Clock>,
        totals: TotalsAccumulator,
    ) -> Self {
        let totals_now = totals.snapshot();
        let (tx, _rx) = watch::channel(TimerSnapshot {
            phase: Phase::Idle,
            elapsed_ms: 0,
            total_study_ms: totals_now.total_study_ms,
            total_break_ms: totals_now.total_break_ms,
        });
        Self {
            state,
            clock,
            totals,
            tx: Arc::new(tx),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn build(&self, state: &TimerState) -> TimerSnapshot {
        let totals = self.totals.snapshot();
        TimerSnapshot {
            phase: state.phase(),
            elapsed_ms: state.elapsed_ms(self.clock.now()),
            total_study_ms: totals.total_study_ms,
            total_break_ms: totals.total_break_ms,
        }
    }

    pub(crate) fn send(&self, snapshot: TimerSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Sample now and publish.
    pub(crate) async fn publish(&self) -> TimerSnapshot {
        let state = self.state.lock().await;
        let snapshot = self.build(&state);
        self.send(snapshot);
        snapshot
    }

    /// Publish only while a phase is running. Returns `None` once idle.
    pub(crate) async fn publish_if_running(&self) -> Option<TimerSnapshot> {
        let state = self.state.lock().await;
        if state.phase().is_idle() {
            return None;
        }
        let snapshot = self.build(&state);
        self.send(snapshot);
        Some(snapshot)
    }
}
