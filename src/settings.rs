use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Tunables for the timer core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// Cadence of elapsed-time samples published to observers.
    pub tick_interval_ms: u64,
    /// Upper bound on any single session store call.
    pub store_timeout_ms: u64,
    /// Background attempts for a failed close before the user is told.
    pub close_retry_attempts: u32,
    /// Backoff before the first retry; doubles on every further attempt.
    pub close_retry_base_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            store_timeout_ms: 10_000,
            close_retry_attempts: 5,
            close_retry_base_ms: 500,
        }
    }
}

impl TimerSettings {
    /// Applies `STUDYTRACK_DEBUG=1|true`, which forces a fast tick cadence.
    pub fn with_env_overrides(mut self) -> Self {
        let debug_mode = std::env::var("STUDYTRACK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.tick_interval_ms = 100;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }

    /// Delay before retry number `attempt` (1-based), capped at one minute.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.close_retry_base_ms.saturating_mul(factor).min(60_000))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        match self.data.read() {
            Ok(guard) => guard.timer.clone(),
            Err(poisoned) => poisoned.into_inner().timer.clone(),
        }
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.timer = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());
    }

    #[test]
    fn update_persists_across_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let custom = TimerSettings {
            tick_interval_ms: 250,
            ..TimerSettings::default()
        };
        store.update_timer(custom.clone()).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.timer(), custom);
    }

    #[test]
    fn partial_file_fills_remaining_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"timer":{"store_timeout_ms":2500}}"#).unwrap();

        let timer = SettingsStore::new(path).unwrap().timer();
        assert_eq!(timer.store_timeout_ms, 2_500);
        assert_eq!(timer.tick_interval_ms, 1_000);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().timer(), TimerSettings::default());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let settings = TimerSettings::default();
        assert_eq!(settings.retry_backoff(1), Duration::from_millis(500));
        assert_eq!(settings.retry_backoff(2), Duration::from_millis(1_000));
        assert_eq!(settings.retry_backoff(3), Duration::from_millis(2_000));
        assert_eq!(settings.retry_backoff(30), Duration::from_millis(60_000));
    }
}
