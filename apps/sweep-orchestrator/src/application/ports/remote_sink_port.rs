//! Remote Sink Port (Driven Port)
//!
//! Interface for publishing progress and result rows to a remote table.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::sweep::{CellValue, SinkWriteError};

/// Cell holding the progress message.
pub const PROGRESS_CELL: &str = "A1";

/// First cell of the header row.
pub const HEADER_CELL: &str = "A2";

/// Rows of cells, as sent to the remote table.
pub type Rows = Vec<Vec<CellValue>>;

/// Port for a key-identified remote table.
#[async_trait]
pub trait RemoteSinkPort: Send + Sync {
    /// Overwrite the cells starting at `range` (A1 notation).
    async fn update_cell_range(&self, range: &str, values: Rows) -> Result<(), SinkWriteError>;

    /// Append rows after the last non-empty row.
    async fn append_rows(&self, rows: Rows) -> Result<(), SinkWriteError>;

    /// Publish a progress message.
    async fn update_progress(&self, message: &str) -> Result<(), SinkWriteError> {
        self.update_cell_range(PROGRESS_CELL, vec![vec![CellValue::from(message)]])
            .await
    }

    /// Write the result header row.
    async fn write_header(&self, columns: &[String]) -> Result<(), SinkWriteError> {
        let row = columns.iter().map(|c| CellValue::from(c.as_str())).collect();
        self.update_cell_range(HEADER_CELL, vec![row]).await
    }
}

#[derive(Debug, Default)]
struct SinkState {
    cells: BTreeMap<String, Rows>,
    appended: Rows,
    append_calls: usize,
    progress: Vec<String>,
    failing_appends: usize,
    failing_updates: usize,
}

/// In-memory remote sink for testing.
///
/// Records every call and can be told to fail upcoming writes.
#[derive(Debug, Default)]
pub struct InMemoryRemoteSink {
    state: Mutex<SinkState>,
}

impl InMemoryRemoteSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` append calls fail.
    pub fn fail_next_appends(&self, n: usize) {
        self.state().failing_appends = n;
    }

    /// Make the next `n` cell updates fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.state().failing_updates = n;
    }

    /// Every row appended so far.
    #[must_use]
    pub fn appended_rows(&self) -> Rows {
        self.state().appended.clone()
    }

    /// Number of successful append calls.
    #[must_use]
    pub fn append_calls(&self) -> usize {
        self.state().append_calls
    }

    /// Every progress message published so far.
    #[must_use]
    pub fn progress_messages(&self) -> Vec<String> {
        self.state().progress.clone()
    }

    /// Current values written at `range`.
    #[must_use]
    pub fn cells(&self, range: &str) -> Option<Rows> {
        self.state().cells.get(range).cloned()
    }
}

#[async_trait]
impl RemoteSinkPort for InMemoryRemoteSink {
    async fn update_cell_range(&self, range: &str, values: Rows) -> Result<(), SinkWriteError> {
        let mut state = self.state();
        if state.failing_updates > 0 {
            state.failing_updates -= 1;
            return Err(SinkWriteError::Connection {
                message: "simulated update failure".to_string(),
            });
        }

        if range == PROGRESS_CELL {
            if let Some(CellValue::Text(message)) = values.first().and_then(|r| r.first()) {
                state.progress.push(message.clone());
            }
        }
        state.cells.insert(range.to_string(), values);
        Ok(())
    }

    async fn append_rows(&self, rows: Rows) -> Result<(), SinkWriteError> {
        let mut state = self.state();
        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(SinkWriteError::Connection {
                message: "simulated append failure".to_string(),
            });
        }

        state.append_calls += 1;
        state.appended.extend(rows);
        Ok(())
    }
}
