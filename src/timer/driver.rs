use std::time::Duration;

use log::debug;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::snapshot::SnapshotPublisher;

// Per-tick logging is very chatty; flip on when debugging the sampler.
const ENABLE_LOGS: bool = false;

use crate::log_debug;

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Repeating sampler that publishes elapsed time while a phase runs.
///
/// Each tick recomputes elapsed time from the absolute anchor, so a tick
/// arriving after a long suspension reports the full wall-clock gap.
pub(crate) struct ElapsedDriver {
    publisher: SnapshotPublisher,
    tick_interval: Duration,
    ticker: Mutex<Option<Ticker>>,
}

impl ElapsedDriver {
    pub(crate) fn new(publisher: SnapshotPublisher, tick_interval: Duration) -> Self {
        Self {
            publisher,
            tick_interval,
            ticker: Mutex::new(None),
        }
    }

    /// Start sampling, replacing any previous ticker.
    ///
    /// Must not be called while the caller holds the timer state lock.
    pub(crate) async fn start(&self) {
        let mut guard = self.ticker.lock().await;
        if let Some(previous) = guard.take() {
            shutdown_ticker(previous).await;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let publisher = self.publisher.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        match publisher.publish_if_running().await {
                            Some(snapshot) => {
                                ticks = ticks.wrapping_add(1);
                                log_debug!("tick {ticks}: {:?} elapsed {}ms", snapshot.phase, snapshot.elapsed_ms);
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!("elapsed-time driver stopped");
        });

        *guard = Some(Ticker { handle, cancel });
    }

    /// Stop sampling and wait for the task to finish. Idempotent.
    ///
    /// Must not be called while the caller holds the timer state lock.
    pub(crate) async fn stop(&self) {
        let previous = self.ticker.lock().await.take();
        if let Some(ticker) = previous {
            shutdown_ticker(ticker).await;
        }
    }

    pub(crate) async fn is_running(&self) -> bool {
        match self.ticker.lock().await.as_ref() {
            Some(ticker) => !ticker.handle.is_finished(),
            None => false,
        }
    }
}

impl Drop for ElapsedDriver {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }
}

async fn shutdown_ticker(ticker: Ticker) {
    ticker.cancel.cancel();
    if let Err(err) = ticker.handle.await {
        if !err.is_cancelled() {
            log::error!("elapsed-time driver task failed: {err}");
        }
    }
}
