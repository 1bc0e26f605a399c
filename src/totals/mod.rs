mod accumulator;
mod cache;

use serde::{Deserialize, Serialize};

use crate::models::SessionKind;

pub use accumulator::TotalsAccumulator;
pub use cache::TotalsCache;

/// Lifetime study and break time for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsSnapshot {
    pub total_study_ms: u64,
    pub total_break_ms: u64,
}

impl TotalsSnapshot {
    pub fn get(&self, kind: SessionKind) -> u64 {
        match kind {
            SessionKind::Study => self.total_study_ms,
            SessionKind::Break => self.total_break_ms,
        }
    }

    fn slot_mut(&mut self, kind: SessionKind) -> &mut u64 {
        match kind {
            SessionKind::Study => &mut self.total_study_ms,
            SessionKind::Break => &mut self.total_break_ms,
        }
    }

    /// Per-field maximum of `self` and `other`.
    pub fn merge_max(self, other: TotalsSnapshot) -> TotalsSnapshot {
        TotalsSnapshot {
            total_study_ms: self.total_study_ms.max(other.total_study_ms),
            total_break_ms: self.total_break_ms.max(other.total_break_ms),
        }
    }
}
