use std::{collections::VecDeque, fs, path::PathBuf};

use anyhow::{Context, Result};
use log::warn;

use super::retry::PendingClose;

/// On-disk mirror of the close retry queue.
///
/// Closes the store has not acknowledged are written here so a restart can
/// still deliver their real end time instead of recovering them as empty.
pub struct CloseJournal {
    path: PathBuf,
}

impl CloseJournal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn load(&self) -> VecDeque<PendingClose> {
        if !self.path.exists() {
            return VecDeque::new();
        }
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Could not read close journal {}: {err}", self.path.display());
                return VecDeque::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!("Discarding unreadable close journal {}: {err}", self.path.display());
            VecDeque::new()
        })
    }

    /// Replace the journal with `pending`. An empty queue removes the file.
    pub(crate) fn save(&self, pending: &VecDeque<PendingClose>) -> Result<()> {
        if pending.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)
                    .with_context(|| format!("Failed to clear {}", self.path.display()))?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(pending)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write close journal to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace close journal {}", self.path.display()))
    }
}
