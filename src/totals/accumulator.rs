use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use log::{error, info};

use crate::error::StoreError;
use crate::models::SessionKind;
use crate::store::{with_timeout, SessionStore};

use super::{TotalsCache, TotalsSnapshot};

/// Running lifetime totals for the signed-in user.
///
/// Values only ever grow: a close adds its duration, and reconciliation with
/// the store takes the per-field maximum of local and remote sums.
#[derive(Clone)]
pub struct TotalsAccumulator {
    user_id: Option<String>,
    totals: Arc<RwLock<TotalsSnapshot>>,
    cache: Option<Arc<TotalsCache>>,
}

impl TotalsAccumulator {
    /// Seeds from the local cache so the last known totals are visible before
    /// any store query completes.
    pub fn new(user_id: Option<String>, cache: Option<Arc<TotalsCache>>) -> Self {
        let seed = match (&user_id, &cache) {
            (Some(user), Some(cache)) => cache.get(user),
            _ => TotalsSnapshot::default(),
        };

        Self {
            user_id,
            totals: Arc::new(RwLock::new(seed)),
            cache,
        }
    }

    pub fn snapshot(&self) -> TotalsSnapshot {
        match self.totals.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Credit a closed session.
    pub fn add(&self, kind: SessionKind, duration_ms: u64) -> TotalsSnapshot {
        let updated = {
            let mut guard = match self.totals.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let slot = guard.slot_mut(kind);
            *slot = slot.saturating_add(duration_ms);
            *guard
        };
        self.write_cache(updated);
        updated
    }

    /// Pull the durable sums from the store and fold them in.
    pub async fn reconcile(
        &self,
        store: &dyn SessionStore,
        timeout: Duration,
    ) -> Result<TotalsSnapshot, StoreError> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Ok(self.snapshot());
        };

        let study = with_timeout(timeout, store.sum_durations(user_id, SessionKind::Study)).await?;
        let brk = with_timeout(timeout, store.sum_durations(user_id, SessionKind::Break)).await?;

        let remote = TotalsSnapshot {
            total_study_ms: study,
            total_break_ms: brk,
        };

        let (before, merged) = {
            let mut guard = match self.totals.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let before = *guard;
            *guard = before.merge_max(remote);
            (before, *guard)
        };

        if merged != before {
            info!(
                "Reconciled totals for {user_id}: study {}ms, break {}ms",
                merged.total_study_ms, merged.total_break_ms
            );
            self.write_cache(merged);
        }
        Ok(merged)
    }

    fn write_cache(&self, totals: TotalsSnapshot) {
        if let (Some(user), Some(cache)) = (&self.user_id, &self.cache) {
            if let Err(err) = cache.put(user, totals) {
                error!("Failed to persist totals cache: {err:?}");
            }
        }
    }
}
