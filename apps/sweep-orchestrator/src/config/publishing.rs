//! Publication cadence and local output settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sweep::{DEFAULT_BAR_WIDTH, DEFAULT_PUBLISH_INTERVAL};

/// Progress publication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Minimum seconds between two publications.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Progress bar width in characters.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            bar_width: default_bar_width(),
        }
    }
}

impl PublishingConfig {
    /// Interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const fn default_interval_secs() -> u64 {
    DEFAULT_PUBLISH_INTERVAL.as_secs()
}

const fn default_bar_width() -> usize {
    DEFAULT_BAR_WIDTH
}

/// Error log location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogConfig {
    /// JSON-lines file failures are appended to.
    #[serde(default = "default_error_log_path")]
    pub path: PathBuf,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            path: default_error_log_path(),
        }
    }
}

fn default_error_log_path() -> PathBuf {
    PathBuf::from("backtest_errors.log")
}
