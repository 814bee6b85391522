//! Writer configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rule::NO_ROTATION;

/// Configuration for a [`RotatingWriter`](crate::RotatingWriter).
///
/// Passed once at construction; there is no hot reload.
///
/// ```rust,ignore
/// let config: WriterConfig = serde_json::from_str(r#"{
///     "base_path": "log/app.log",
///     "rule": "hour",
///     "keep_files": 24,
///     "check_interval": "500ms"
/// }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Base path; rotated files are `<base_path>.<suffix>`.
    pub base_path: PathBuf,
    /// Rotation rule name (`"no"` never rotates).
    pub rule: String,
    /// Rotated files to retain; `0` keeps everything.
    pub keep_files: usize,
    /// How often the live file is re-validated between rotations.
    /// Zero disables the re-check.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Delay before each expired-file deletion during cleanup.
    #[serde(with = "humantime_serde")]
    pub delete_pace: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            rule: NO_ROTATION.to_owned(),
            keep_files: 0,
            check_interval: Duration::from_secs(1),
            delete_pace: Duration::from_secs(1),
        }
    }
}

impl WriterConfig {
    /// Default configuration for `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Set the rotation rule.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    /// Set the retention count.
    pub fn with_keep_files(mut self, keep_files: usize) -> Self {
        self.keep_files = keep_files;
        self
    }

    /// Set the re-check interval.
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Set the cleanup deletion pace.
    pub fn with_delete_pace(mut self, delete_pace: Duration) -> Self {
        self.delete_pace = delete_pace;
        self
    }

    /// Whether the periodic re-check runs.
    pub fn recheck_enabled(&self) -> bool {
        !self.check_interval.is_zero()
    }

    /// Reject configurations that can never produce a writable file.
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(Error::config("base path is required"));
        }
        if self.base_path.file_name().is_none() {
            return Err(Error::config(format!(
                "base path '{}' does not name a file",
                self.base_path.display()
            )));
        }
        if self.base_path.is_dir() {
            return Err(Error::config(format!(
                "base path '{}' is a directory",
                self.base_path.display()
            )));
        }
        if self.rule.is_empty() {
            return Err(Error::config("rotation rule name is empty"));
        }
        Ok(())
    }
}
