//! # studytrack
//!
//! Study/break timer core. A [`TimerController`] tracks which activity the
//! user is doing and for how long, persists every session boundary through a
//! [`SessionStore`], keeps lifetime totals, and publishes a [`TimerSnapshot`]
//! to observers on every tick and transition.
//!
//! Elapsed time is always recomputed from the absolute session start, so a
//! host that was suspended for minutes reports the true elapsed time as soon
//! as it samples again.

pub mod clock;
pub mod commands;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod notify;
pub mod settings;
pub mod store;
pub mod timer;
pub mod totals;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::Database;
pub use error::{StoreError, TimerError};
pub use models::{SessionId, SessionKind, TimerSession};
pub use notify::{LogNotifier, NotificationKind, Notifier};
pub use settings::{SettingsStore, TimerSettings};
pub use store::{MemoryStore, SessionStore};
pub use timer::{CloseJournal, PendingClose, Phase, TimerController, TimerSnapshot};
pub use totals::{TotalsAccumulator, TotalsCache, TotalsSnapshot};

const DB_FILE: &str = "studytrack.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const TOTALS_FILE: &str = "totals.json";
const JOURNAL_FILE: &str = "pending_closes.json";

/// Open the on-disk stores under `data_dir` and build a ready controller.
///
/// Closes journaled by a previous process are delivered and sessions it left
/// open without a known end are closed empty. Totals are then reconciled
/// with the session log. Neither step is fatal: the cached totals are
/// already visible if reconciliation fails.
pub async fn bootstrap(data_dir: &Path, user_id: Option<String>) -> Result<TimerController> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?
        .timer()
        .with_env_overrides();
    let database = Database::new(data_dir.join(DB_FILE))?;
    let cache = Arc::new(TotalsCache::new(data_dir.join(TOTALS_FILE))?);
    let totals = TotalsAccumulator::new(user_id.clone(), Some(cache));

    let controller = TimerController::new(
        user_id,
        Arc::new(database),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        totals,
        settings,
        Some(CloseJournal::new(data_dir.join(JOURNAL_FILE))),
    );

    match controller.recover_interrupted().await {
        Ok(0) => {}
        Ok(count) => warn!("Closed {count} session(s) interrupted by a previous shutdown"),
        Err(err) => warn!("Could not recover interrupted sessions: {err}"),
    }

    if let Err(err) = controller.reconcile_totals().await {
        warn!("Totals reconciliation failed, showing cached values: {err}");
    }

    Ok(controller)
}

fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STUDYTRACK_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("studytrack"))
        .context("no data directory available; set STUDYTRACK_DATA_DIR")
}

/// Terminal host: reads commands from stdin until `quit` or end of input.
pub fn run() -> Result<()> {
    utils::logging::init_logging(log::LevelFilter::Info);

    let user_id = std::env::var("STUDYTRACK_USER").ok().filter(|u| !u.is_empty());
    let data_dir = data_dir()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        info!("studytrack starting up (data in {})", data_dir.display());
        let controller = bootstrap(&data_dir, user_id).await?;

        println!("{}", commands::describe(&controller.snapshot().await));
        println!("{}", commands::HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let command = match line.parse::<commands::Command>() {
                Ok(command) => command,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };
            match commands::execute(&controller, command).await {
                Some(output) => println!("{output}"),
                None => break,
            }
        }

        controller.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
