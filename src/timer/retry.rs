use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, TimerError};
use crate::models::{SessionId, SessionKind};
use crate::notify::{NotificationKind, Notifier};
use crate::settings::TimerSettings;
use crate::store::{with_timeout, SessionStore};

use super::journal::CloseJournal;

/// A close that the store has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClose {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    attempts: u32,
    parked: bool,
}

impl PendingClose {
    pub fn new(
        session_id: SessionId,
        kind: SessionKind,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            session_id,
            kind,
            ended_at,
            duration_ms,
            attempts: 1,
            parked: false,
        }
    }

    /// Background retries are exhausted; only an inline flush retries it.
    pub fn is_parked(&self) -> bool {
        self.parked
    }
}

struct Shared {
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    settings: TimerSettings,
    pending: Mutex<VecDeque<PendingClose>>,
    journal: Option<CloseJournal>,
    wake: Notify,
}

impl Shared {
    async fn attempt(&self, close: &PendingClose) -> Result<(), StoreError> {
        with_timeout(
            self.settings.store_timeout(),
            self.store
                .close_session(&close.session_id, close.ended_at, close.duration_ms),
        )
        .await
    }

    fn record(&self, pending: &VecDeque<PendingClose>) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.save(pending) {
                warn!("Failed to write close journal: {err:#}");
            }
        }
    }
}

/// At-least-once delivery for session closes the store rejected.
///
/// Failed closes are retried in the background with exponential backoff.
/// When the retry budget runs out the user is notified once and the close is
/// parked; parked closes are still retried by [`CloseRetryQueue::flush`]
/// before the next session is opened.
pub(crate) struct CloseRetryQueue {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CloseRetryQueue {
    pub(crate) fn new(
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        settings: TimerSettings,
        journal: Option<CloseJournal>,
    ) -> Self {
        let restored = journal.as_ref().map(CloseJournal::load).unwrap_or_default();
        if !restored.is_empty() {
            info!("Restored {} undelivered close(s) from journal", restored.len());
        }
        let shared = Arc::new(Shared {
            store,
            notifier,
            settings,
            pending: Mutex::new(restored),
            journal,
            wake: Notify::new(),
        });
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(retry_loop(shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) async fn enqueue(&self, close: PendingClose) {
        {
            let mut pending = self.shared.pending.lock().await;
            pending.push_back(close);
            self.shared.record(&pending);
        }
        self.shared.wake.notify_one();
    }

    pub(crate) async fn pending(&self) -> Vec<PendingClose> {
        self.shared.pending.lock().await.iter().cloned().collect()
    }

    /// Try every queued close once, right now. Returns `Ok` when nothing is
    /// left pending, otherwise the first failure.
    pub(crate) async fn flush(&self) -> Result<(), TimerError> {
        let mut pending = self.shared.pending.lock().await;
        let mut first_error = None;
        let mut remaining = VecDeque::with_capacity(pending.len());

        while let Some(mut close) = pending.pop_front() {
            match self.shared.attempt(&close).await {
                Ok(()) => info!("Flushed pending close for session {}", close.session_id),
                Err(source) => {
                    close.attempts = close.attempts.saturating_add(1);
                    if first_error.is_none() {
                        first_error = Some(TimerError::SessionCloseFailed {
                            session_id: close.session_id.clone(),
                            source,
                        });
                    }
                    remaining.push_back(close);
                }
            }
        }

        *pending = remaining;
        self.shared.record(&pending);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop the background worker. Queued closes stay in memory.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("close retry worker failed: {err}");
                }
            }
        }
    }
}

impl Drop for CloseRetryQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

enum Step {
    /// Nothing retryable is queued.
    Idle,
    /// The head of the queue changed; look again immediately.
    Advanced,
    Backoff(std::time::Duration),
}

async fn retry_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let step = retry_next(&shared).await;
        let wait = match step {
            Step::Advanced => continue,
            Step::Idle => None,
            Step::Backoff(delay) => Some(delay),
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.wake.notified(), if wait.is_none() => {}
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
        }
    }
    info!("close retry worker shutting down");
}

/// Retry the oldest close that still has background attempts left.
async fn retry_next(shared: &Shared) -> Step {
    let close = {
        let pending = shared.pending.lock().await;
        match pending.iter().find(|close| !close.parked) {
            Some(close) => close.clone(),
            None => return Step::Idle,
        }
    };

    let outcome = shared.attempt(&close).await;

    let mut pending = shared.pending.lock().await;
    // A flush may have settled it while the lock was released.
    let Some(index) = pending
        .iter()
        .position(|entry| entry.session_id == close.session_id)
    else {
        return Step::Advanced;
    };

    let step = match outcome {
        Ok(()) => {
            info!(
                "Delivered close for session {} after {} attempt(s)",
                close.session_id,
                pending[index].attempts + 1
            );
            pending.remove(index);
            Step::Advanced
        }
        Err(source) => {
            let entry = &mut pending[index];
            entry.attempts = entry.attempts.saturating_add(1);
            let budget = shared.settings.close_retry_attempts.saturating_add(1);

            if entry.attempts >= budget {
                entry.parked = true;
                let err = TimerError::SessionCloseFailed {
                    session_id: entry.session_id.clone(),
                    source,
                };
                error!("Giving up background retries: {err}");
                shared
                    .notifier
                    .notify(NotificationKind::Error, err.user_message());
                Step::Advanced
            } else {
                warn!(
                    "Close retry {} for session {} failed: {source}",
                    entry.attempts - 1,
                    entry.session_id
                );
                Step::Backoff(shared.settings.retry_backoff(entry.attempts - 1))
            }
        }
    };
    shared.record(&pending);
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::models::TimerSession;
    use crate::notify::LogNotifier;

    /// Store whose closes land only after a long round trip.
    #[derive(Default)]
    struct SlowCloseStore {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for SlowCloseStore {
        async fn create_session(
            &self,
            _user_id: &str,
            _kind: SessionKind,
            _started_at: DateTime<Utc>,
        ) -> Result<SessionId, StoreError> {
            Ok(SessionId::from("unused"))
        }

        async fn close_session(
            &self,
            _session_id: &SessionId,
            _ended_at: DateTime<Utc>,
            _duration_ms: u64,
        ) -> Result<(), StoreError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }

        async fn sum_durations(&self, _user_id: &str, _kind: SessionKind) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn open_sessions(&self, _user_id: &str) -> Result<Vec<TimerSession>, StoreError> {
            Ok(Vec::new())
        }

        async fn recent_sessions(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<TimerSession>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn close(id: &str) -> PendingClose {
        PendingClose::new(
            SessionId::from(id),
            SessionKind::Study,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            1_000,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_is_not_blocked_by_an_attempt_in_flight() {
        let store = Arc::new(SlowCloseStore::default());
        let settings = TimerSettings {
            store_timeout_ms: 30_000,
            ..TimerSettings::default()
        };
        let queue = CloseRetryQueue::new(store.clone(), Arc::new(LogNotifier), settings, None);

        queue.enqueue(close("a")).await;
        while store.closes.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_millis(10), queue.enqueue(close("b")))
            .await
            .expect("enqueue waited for the worker's store call");
        assert_eq!(queue.pending().await.len(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(queue.pending().await.is_empty());
        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn flushed_entry_is_not_touched_by_a_late_worker_reply() {
        let store = Arc::new(SlowCloseStore::default());
        let settings = TimerSettings {
            store_timeout_ms: 30_000,
            ..TimerSettings::default()
        };
        let queue = CloseRetryQueue::new(store.clone(), Arc::new(LogNotifier), settings, None);

        queue.enqueue(close("a")).await;
        while store.closes.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        queue.flush().await.unwrap();
        assert!(queue.pending().await.is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(queue.pending().await.is_empty());
        queue.shutdown().await;
    }
}
