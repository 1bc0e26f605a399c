#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use studytrack_lib::{
    Clock, CloseJournal, ManualClock, MemoryStore, NotificationKind, Notifier, SessionId,
    SessionKind, SessionStore, StoreError, TimerController, TimerSession, TimerSettings,
    TotalsAccumulator,
};

/// Memory store with switchable failures and per-call counters.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_create: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_sum: AtomicBool,
    pub creates: AtomicUsize,
    pub closes: AtomicUsize,
    pub create_delay_ms: AtomicU64,
    pub create_ack_delay_ms: AtomicU64,
    pub close_ack_delay_ms: AtomicU64,
    pub study_seed_ms: Mutex<u64>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst) + self.closes.load(Ordering::SeqCst)
    }

    pub fn open_count(&self, user_id: &str) -> usize {
        self.inner
            .sessions()
            .iter()
            .filter(|s| s.user_id == user_id && s.is_open())
            .count()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

/// Sleep after the write landed, as a slow network reply would.
async fn ack_delay(delay_ms: &AtomicU64) {
    let delay = delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}

fn backend(msg: &str) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(msg.to_string()))
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(backend("network unreachable"));
        }
        let id = self.inner.create_session(user_id, kind, started_at).await?;
        ack_delay(&self.create_ack_delay_ms).await;
        Ok(id)
    }

    async fn close_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(backend("network unreachable"));
        }
        self.inner.close_session(session_id, ended_at, duration_ms).await?;
        ack_delay(&self.close_ack_delay_ms).await;
        Ok(())
    }

    async fn sum_durations(&self, user_id: &str, kind: SessionKind) -> Result<u64, StoreError> {
        if self.fail_sum.load(Ordering::SeqCst) {
            return Err(backend("network unreachable"));
        }
        let stored = self.inner.sum_durations(user_id, kind).await?;
        let seed = match kind {
            SessionKind::Study => *self.study_seed_ms.lock().unwrap(),
            SessionKind::Break => 0,
        };
        Ok(stored + seed)
    }

    async fn open_sessions(&self, user_id: &str) -> Result<Vec<TimerSession>, StoreError> {
        self.inner.open_sessions(user_id).await
    }

    async fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TimerSession>, StoreError> {
        self.inner.recent_sessions(user_id, limit).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(NotificationKind, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }
}

pub const USER: &str = "user-1";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn fast_settings() -> TimerSettings {
    TimerSettings {
        tick_interval_ms: 1_000,
        store_timeout_ms: 5_000,
        close_retry_attempts: 2,
        close_retry_base_ms: 100,
    }
}

pub struct Harness {
    pub controller: TimerController,
    pub store: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

pub fn harness_for(user: Option<&str>, store: Arc<FlakyStore>, totals: TotalsAccumulator) -> Harness {
    harness_with(user, store, totals, None)
}

pub fn harness_with(
    user: Option<&str>,
    store: Arc<FlakyStore>,
    totals: TotalsAccumulator,
    journal: Option<CloseJournal>,
) -> Harness {
    let notifier = RecordingNotifier::new();
    let clock = Arc::new(ManualClock::new(epoch()));
    let controller = TimerController::new(
        user.map(str::to_string),
        store.clone(),
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
        totals,
        fast_settings(),
        journal,
    );
    Harness {
        controller,
        store,
        notifier,
        clock,
    }
}

pub fn harness() -> Harness {
    harness_for(
        Some(USER),
        FlakyStore::new(),
        TotalsAccumulator::new(Some(USER.to_string()), None),
    )
}
