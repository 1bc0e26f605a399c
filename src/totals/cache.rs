use std::{collections::HashMap, fs, path::PathBuf, sync::RwLock};

use anyhow::{Context, Result};
use log::warn;

use super::TotalsSnapshot;

/// On-disk per-user totals so the last known values are shown immediately on
/// startup, before the store answers.
pub struct TotalsCache {
    path: PathBuf,
    data: RwLock<HashMap<String, TotalsSnapshot>>,
}

impl TotalsCache {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read totals cache from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Discarding unreadable totals cache {}: {err}", path.display());
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self, user_id: &str) -> TotalsSnapshot {
        let guard = match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(user_id).copied().unwrap_or_default()
    }

    /// Replace the cached totals for `user_id` and write the file.
    pub(crate) fn put(&self, user_id: &str, totals: TotalsSnapshot) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(user_id.to_string(), totals);
        self.persist(&guard)
    }

    fn persist(&self, data: &HashMap<String, TotalsSnapshot>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write totals cache to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace totals cache {}", self.path.display()))
    }
}
