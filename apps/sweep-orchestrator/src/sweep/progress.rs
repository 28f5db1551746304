//! Progress tracking and throttled progress publication.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default interval between two progress publications.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

/// Default width of the textual progress bar.
pub const DEFAULT_BAR_WIDTH: usize = 50;

/// Completed vs total trials. Owned by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    completed: u64,
    total: u64,
}

impl ProgressState {
    /// Create a fresh state for `total` trials.
    #[must_use]
    pub const fn new(total: u64) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    /// Completed trials.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Total trials.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Record one more completed trial. Returns `false` if already complete.
    pub const fn advance(&mut self) -> bool {
        if self.completed >= self.total {
            return false;
        }
        self.completed += 1;
        true
    }

    /// Whether every trial has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Get completion percentage in `[0, 100]`.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Renders progress as a fixed-width textual bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBar {
    width: usize,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            width: DEFAULT_BAR_WIDTH,
        }
    }
}

impl ProgressBar {
    /// Create a bar `width` characters wide.
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self { width }
    }

    /// Message shown before any trial completes.
    #[must_use]
    pub fn initial_message(&self, total: u64) -> String {
        format!("Loading: 0/{total} iterations completed")
    }

    /// Render the bar, e.g. `Loading: [#####-----] 50.00%`.
    #[must_use]
    pub fn render(&self, state: &ProgressState) -> String {
        if state.total() == 0 {
            return "Loading: complete (no trials)".to_string();
        }

        let percent = state.percentage();
        let filled = ((percent * self.width as f64 / 100.0).floor() as usize).min(self.width);
        format!(
            "Loading: [{}{}] {percent:.2}%",
            "#".repeat(filled),
            "-".repeat(self.width - filled)
        )
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Start at `start`.
    #[must_use]
    pub const fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

/// Decides when progress and buffered rows may be published.
///
/// A publication is allowed once `interval` has elapsed since the last one,
/// or when the run has just completed.
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    interval: Duration,
    last_publish: Instant,
}

impl PublishThrottle {
    /// Create a throttle whose first window starts at `start`.
    #[must_use]
    pub const fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_publish: start,
        }
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a publication is due at `now`. Does not reset the window.
    #[must_use]
    pub fn is_due(&self, now: Instant, state: &ProgressState) -> bool {
        state.is_complete() || now.saturating_duration_since(self.last_publish) >= self.interval
    }

    /// Check and, if due, start a new window at `now`.
    pub fn try_acquire(&mut self, now: Instant, state: &ProgressState) -> bool {
        if self.is_due(now, state) {
            self.last_publish = now;
            true
        } else {
            false
        }
    }
}
