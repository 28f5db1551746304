//! Throttled publication of progress and buffered result rows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use tracing::{info, warn};

use crate::application::ports::{RemoteSinkPort, Rows};

use super::progress::{ProgressBar, ProgressState, PublishThrottle};
use super::types::CellValue;

/// Publishes progress and appends buffered rows at most once per interval.
///
/// Rows are buffered as they arrive. On each throttle tick the buffer is
/// appended in one call (cleared only when the append succeeds) and the
/// progress bar is published. Without a sink, progress is only logged.
pub struct BatchedPublisher {
    sink: Option<Arc<dyn RemoteSinkPort>>,
    throttle: PublishThrottle,
    bar: ProgressBar,
    buffer: Rows,
    completion_published: bool,
    failures: u64,
}

impl std::fmt::Debug for BatchedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedPublisher")
            .field("remote", &self.sink.is_some())
            .field("throttle", &self.throttle)
            .field("buffered", &self.buffer.len())
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl BatchedPublisher {
    /// Create a publisher whose first throttle window opens at `start`.
    #[must_use]
    pub fn new(
        sink: Option<Arc<dyn RemoteSinkPort>>,
        interval: Duration,
        bar: ProgressBar,
        start: Instant,
    ) -> Self {
        Self {
            sink,
            throttle: PublishThrottle::new(interval, start),
            bar,
            buffer: Vec::new(),
            completion_published: false,
            failures: 0,
        }
    }

    /// Publish the initial progress message and the header row.
    pub async fn initialize(&mut self, total: u64, header: &[String]) {
        let message = self.bar.initial_message(total);
        info!(total, "{message}");

        let Some(sink) = self.sink.clone() else {
            return;
        };
        if let Err(e) = sink.update_progress(&message).await {
            self.sink_failed("progress", &e);
        }
        if let Err(e) = sink.write_header(header).await {
            self.sink_failed("header", &e);
        }
    }

    /// Record one consumed outcome; `row` is its cells when it was appended
    /// to the table. Publishes when the throttle allows.
    pub async fn on_progress(&mut self, row: Option<Vec<CellValue>>, state: &ProgressState, now: Instant) {
        if let Some(row) = row {
            if self.sink.is_some() {
                self.buffer.push(row);
            }
        }

        if self.throttle.try_acquire(now, state) {
            self.tick(state).await;
        }
    }

    /// Flush rows still buffered and make sure the final state went out.
    pub async fn finish(&mut self, state: &ProgressState) {
        if !self.completion_published {
            self.tick(state).await;
        } else if !self.buffer.is_empty() {
            self.flush().await;
        }
    }

    async fn tick(&mut self, state: &ProgressState) {
        if !self.buffer.is_empty() {
            self.flush().await;
        }
        self.publish_progress(state).await;
        if state.is_complete() {
            self.completion_published = true;
        }
    }

    async fn flush(&mut self) {
        let Some(sink) = self.sink.clone() else {
            return;
        };

        let count = self.buffer.len();
        match sink.append_rows(self.buffer.clone()).await {
            Ok(()) => {
                info!(rows = count, "Appended result rows");
                self.buffer.clear();
            }
            Err(e) => {
                self.sink_failed("append", &e);
            }
        }
    }

    async fn publish_progress(&mut self, state: &ProgressState) {
        let message = self.bar.render(state);
        gauge!("sweep_progress_percent").set(state.percentage());
        info!(
            completed = state.completed(),
            total = state.total(),
            "{message}"
        );

        let Some(sink) = self.sink.clone() else {
            return;
        };
        if let Err(e) = sink.update_progress(&message).await {
            self.sink_failed("progress", &e);
        }
    }

    fn sink_failed(&mut self, operation: &'static str, error: &dyn std::error::Error) {
        counter!("sweep_sink_failures_total", "sink" => "remote").increment(1);
        warn!(
            operation,
            error = %error,
            buffered = self.buffer.len(),
            "Remote sink write failed; will retry at next flush"
        );
        self.failures += 1;
    }

    /// Rows waiting for the next successful append.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Remote writes that failed so far.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }
}
