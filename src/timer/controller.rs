use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};

use crate::clock::{clamped_duration_ms, Clock};
use crate::error::{Result, StoreError, TimerError};
use crate::models::{SessionId, SessionKind, TimerSession};
use crate::notify::{NotificationKind, Notifier};
use crate::settings::TimerSettings;
use crate::store::{with_timeout, SessionStore};
use crate::totals::{TotalsAccumulator, TotalsSnapshot};

use super::driver::ElapsedDriver;
use super::journal::CloseJournal;
use super::retry::{CloseRetryQueue, PendingClose};
use super::snapshot::{SnapshotPublisher, TimerSnapshot};
use super::state::{ActiveSession, Phase, TimerState};

/// A session whose end has been sent to the store (or queued for retry).
struct ClosedSession {
    session: ActiveSession,
    duration_ms: u64,
}

struct ControllerInner {
    user_id: Option<String>,
    state: Arc<Mutex<TimerState>>,
    transition: Mutex<()>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    totals: TotalsAccumulator,
    publisher: SnapshotPublisher,
    driver: ElapsedDriver,
    retry: CloseRetryQueue,
    settings: TimerSettings,
}

/// Owner of the timer state machine.
///
/// Cheap to clone; every clone drives the same timer. All transitions are
/// serialized: a transition that arrives while another is running fails with
/// [`TimerError::TransitionInProgress`] instead of interleaving.
#[derive(Clone)]
pub struct TimerController {
    inner: Arc<ControllerInner>,
}

impl TimerController {
    /// Must be called inside a Tokio runtime; the close retry worker is
    /// spawned immediately. Closes left in `journal` by a previous process
    /// are queued again.
    pub fn new(
        user_id: Option<String>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        totals: TotalsAccumulator,
        settings: TimerSettings,
        journal: Option<CloseJournal>,
    ) -> Self {
        let state = Arc::new(Mutex::new(TimerState::new()));
        let publisher = SnapshotPublisher::new(state.clone(), clock.clone(), totals.clone());
        let driver = ElapsedDriver::new(publisher.clone(), settings.tick_interval());
        let retry = CloseRetryQueue::new(
            store.clone(),
            notifier.clone(),
            settings.clone(),
            journal,
        );

        Self {
            inner: Arc::new(ControllerInner {
                user_id,
                state,
                transition: Mutex::new(()),
                store,
                notifier,
                clock,
                totals,
                publisher,
                driver,
                retry,
                settings,
            }),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.inner.user_id.as_deref()
    }

    pub async fn phase(&self) -> Phase {
        self.inner.state.lock().await.phase()
    }

    pub fn totals(&self) -> TotalsSnapshot {
        self.inner.totals.snapshot()
    }

    /// Current snapshot, freshly sampled but not broadcast.
    pub async fn snapshot(&self) -> TimerSnapshot {
        let state = self.inner.state.lock().await;
        self.inner.publisher.build(&state)
    }

    /// Receiver that sees every tick and every transition.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.inner.publisher.subscribe()
    }

    /// Sample the clock and broadcast immediately, e.g. when the host
    /// returns to the foreground.
    pub async fn sample_now(&self) -> TimerSnapshot {
        self.inner.publisher.publish().await
    }

    /// Closes that the store has not acknowledged yet.
    pub async fn pending_closes(&self) -> Vec<PendingClose> {
        self.inner.retry.pending().await
    }

    pub async fn is_sampling(&self) -> bool {
        self.inner.driver.is_running().await
    }

    /// Begin a study or break phase.
    ///
    /// Starting the phase that is already running is a no-op. Starting the
    /// other phase closes the running session first; the outgoing phase stays
    /// visible until the new session is confirmed or refused, so observers
    /// never see the gap between the two.
    pub async fn start_timer(&self, kind: SessionKind) -> Result<()> {
        let Some(user_id) = self.inner.user_id.clone() else {
            let err = TimerError::NotAuthenticated;
            warn!("Refusing to start {kind} timer: {err}");
            self.report(&err);
            return Err(err);
        };

        let _transition = self
            .inner
            .transition
            .try_lock()
            .map_err(|_| TimerError::TransitionInProgress)?;

        let current = self.inner.state.lock().await.phase();
        if current == Phase::for_kind(kind) {
            debug!("{kind} timer already running; ignoring start");
            return Ok(());
        }

        let outgoing = if current.is_idle() {
            None
        } else {
            self.end_active().await
        };

        if let Err(err) = self.inner.retry.flush().await {
            let err = match err {
                TimerError::SessionCloseFailed { source, .. } => {
                    TimerError::SessionCreateFailed(source)
                }
                other => other,
            };
            error!("Cannot open {kind} session while a close is undelivered: {err}");
            self.settle(outgoing, None).await;
            self.report(&err);
            return Err(err);
        }

        let started_at = self.inner.clock.now();
        let created = with_timeout(
            self.inner.settings.store_timeout(),
            self.inner.store.create_session(&user_id, kind, started_at),
        )
        .await;

        let session_id = match created {
            Ok(id) => id,
            Err(source) => {
                // The row may have been committed even though the ack was lost.
                if matches!(
                    source,
                    StoreError::Timeout { .. } | StoreError::OpenSessionExists { .. }
                ) {
                    match self.close_orphans(&user_id).await {
                        Ok(0) => {}
                        Ok(count) => warn!("Closed {count} orphaned open session(s) for {user_id}"),
                        Err(err) => warn!("Could not close orphaned sessions for {user_id}: {err}"),
                    }
                }
                let err = TimerError::SessionCreateFailed(source);
                error!("Failed to start {kind} timer: {err}");
                self.settle(outgoing, None).await;
                self.report(&err);
                return Err(err);
            }
        };

        self.settle(
            outgoing,
            Some(ActiveSession {
                session_id: session_id.clone(),
                kind,
                started_at,
            }),
        )
        .await;
        self.inner.driver.start().await;

        info!("Started {kind} session {session_id} at {started_at}");
        Ok(())
    }

    /// Stop the running phase. Stopping while idle is a no-op.
    ///
    /// The stop always takes effect locally; if the store rejects the close
    /// it is queued for background retry.
    pub async fn stop_timer(&self) -> Result<()> {
        let _transition = self
            .inner
            .transition
            .try_lock()
            .map_err(|_| TimerError::TransitionInProgress)?;

        if self.inner.state.lock().await.phase().is_idle() {
            debug!("stop requested while idle; nothing to do");
            return Ok(());
        }

        self.close_active().await;
        Ok(())
    }

    /// Close whatever session is running and return to idle. This is the body
    /// of [`TimerController::stop_timer`]. Caller holds the transition lock.
    async fn close_active(&self) {
        if let Some(closed) = self.end_active().await {
            self.settle(Some(closed), None).await;
        }
    }

    /// Persist the end of the running session without leaving its phase.
    /// Sampling stops; the state is updated later by [`Self::settle`].
    async fn end_active(&self) -> Option<ClosedSession> {
        let (session, ended_at) = {
            let state = self.inner.state.lock().await;
            (state.active()?.clone(), self.inner.clock.now())
        };

        self.inner.driver.stop().await;

        let duration_ms = clamped_duration_ms(session.started_at, ended_at);
        let closed = with_timeout(
            self.inner.settings.store_timeout(),
            self.inner
                .store
                .close_session(&session.session_id, ended_at, duration_ms),
        )
        .await;

        if let Err(source) = closed {
            warn!(
                "Close of session {} failed, queueing retry: {source}",
                session.session_id
            );
            self.inner
                .retry
                .enqueue(PendingClose::new(
                    session.session_id.clone(),
                    session.kind,
                    ended_at,
                    duration_ms,
                ))
                .await;
        }

        Some(ClosedSession {
            session,
            duration_ms,
        })
    }

    /// Apply the outcome of a transition in one step and broadcast it.
    async fn settle(&self, closed: Option<ClosedSession>, next: Option<ActiveSession>) {
        let mut state = self.inner.state.lock().await;
        if let Some(closed) = &closed {
            state.finish();
            self.inner
                .totals
                .add(closed.session.kind, closed.duration_ms);
        }
        if let Some(next) = next {
            state.begin(next);
        }
        let snapshot = self.inner.publisher.build(&state);
        self.inner.publisher.send(snapshot);
        drop(state);

        if let Some(closed) = closed {
            info!(
                "Closed {} session {} after {}ms",
                closed.session.kind, closed.session.session_id, closed.duration_ms
            );
        }
    }

    /// Pull durable totals from the store and broadcast the result.
    ///
    /// Waits for any running transition, so a close the store has already
    /// counted is always credited locally before the sums are merged.
    pub async fn reconcile_totals(&self) -> std::result::Result<TotalsSnapshot, StoreError> {
        let _transition = self.inner.transition.lock().await;
        let merged = self
            .inner
            .totals
            .reconcile(self.inner.store.as_ref(), self.inner.settings.store_timeout())
            .await?;
        self.inner.publisher.publish().await;
        Ok(merged)
    }

    /// Close sessions left open by a previous process.
    ///
    /// Journaled closes are delivered first, with their real end time. The
    /// rest have no known end, so they are closed as empty intervals and not
    /// credited to the totals. Returns how many were closed empty.
    pub async fn recover_interrupted(&self) -> std::result::Result<usize, StoreError> {
        let Some(user_id) = self.inner.user_id.as_deref() else {
            return Ok(0);
        };
        let _transition = self.inner.transition.lock().await;

        if let Err(err) = self.inner.retry.flush().await {
            warn!("Journaled closes still undelivered: {err}");
        }
        self.close_orphans(user_id).await
    }

    /// Close the user's open rows that the timer is not measuring and that
    /// have no queued close. Caller holds the transition lock.
    async fn close_orphans(&self, user_id: &str) -> std::result::Result<usize, StoreError> {
        let timeout = self.inner.settings.store_timeout();
        let open = with_timeout(timeout, self.inner.store.open_sessions(user_id)).await?;

        let active_id = self
            .inner
            .state
            .lock()
            .await
            .active()
            .map(|active| active.session_id.clone());
        let queued: Vec<SessionId> = self
            .inner
            .retry
            .pending()
            .await
            .into_iter()
            .map(|close| close.session_id)
            .collect();

        let mut closed = 0;
        for session in open
            .iter()
            .filter(|s| Some(&s.id) != active_id.as_ref() && !queued.contains(&s.id))
        {
            warn!(
                "Closing orphaned {} session {} started at {}",
                session.kind, session.id, session.started_at
            );
            with_timeout(
                timeout,
                self.inner
                    .store
                    .close_session(&session.id, session.started_at, 0),
            )
            .await?;
            closed += 1;
        }
        Ok(closed)
    }

    /// Newest-first session history for the signed-in user.
    pub async fn recent_sessions(
        &self,
        limit: usize,
    ) -> std::result::Result<Vec<TimerSession>, StoreError> {
        let Some(user_id) = self.inner.user_id.as_deref() else {
            return Ok(Vec::new());
        };
        with_timeout(
            self.inner.settings.store_timeout(),
            self.inner.store.recent_sessions(user_id, limit),
        )
        .await
    }

    /// Try queued closes one last time, then cancel background tasks. The
    /// running session, if any, stays open in
    /// the store and is recovered on next start.
    pub async fn shutdown(&self) {
        self.inner.driver.stop().await;
        if let Err(err) = self.inner.retry.flush().await {
            warn!("Leaving undelivered closes in the journal: {err}");
        }
        self.inner.retry.shutdown().await;
        info!("Timer controller shut down");
    }

    fn report(&self, err: &TimerError) {
        self.inner
            .notifier
            .notify(NotificationKind::Error, err.user_message());
    }
}
