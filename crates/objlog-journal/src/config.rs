use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, JournalResult};

/// When buffered journal records are pushed to the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush after every appended record (safest, slowest).
    EveryRecord,
    /// Flush from a background timer every `interval_ms` milliseconds.
    Periodic { interval_ms: u64 },
    /// Flush only on explicit request and on close.
    Manual,
}

impl FlushPolicy {
    /// Default timer period: one minute.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn periodic(interval: Duration) -> Self {
        Self::Periodic {
            interval_ms: interval.as_millis() as u64,
        }
    }

    /// Timer period, if this policy runs a flush timer.
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Periodic { interval_ms } => Some(Duration::from_millis((*interval_ms).max(1))),
            _ => None,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::periodic(Self::DEFAULT_INTERVAL)
    }
}

/// Configuration of a [`crate::BinlogStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Sub-directory receiving archived generations.
    pub archive_dir: String,
    /// Extension of snapshot files.
    pub snapshot_ext: String,
    /// Extension of journal files.
    pub journal_ext: String,
    /// Flush strategy of the live journal.
    pub flush_policy: FlushPolicy,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            archive_dir: "logs".into(),
            snapshot_ext: "map".into(),
            journal_ext: "log".into(),
            flush_policy: FlushPolicy::default(),
        }
    }
}

impl JournalConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> JournalResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| JournalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> JournalResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> JournalResult<String> {
        toml::to_string_pretty(self).map_err(|e| JournalError::Config(e.to_string()))
    }

    pub fn validate(&self) -> JournalResult<()> {
        for (key, ext) in [("snapshot_ext", &self.snapshot_ext), ("journal_ext", &self.journal_ext)] {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(JournalError::Config(format!("{key} must be a bare extension, got {ext:?}")));
            }
        }
        if self.snapshot_ext.eq_ignore_ascii_case(&self.journal_ext) {
            return Err(JournalError::Config(
                "snapshot_ext and journal_ext must differ".into(),
            ));
        }
        if self.archive_dir.is_empty() || self.archive_dir.contains(['/', '\\']) {
            return Err(JournalError::Config(format!(
                "archive_dir must be a single directory name, got {:?}",
                self.archive_dir
            )));
        }
        Ok(())
    }
}
