//! Durable record of failed trials.
//!
//! Every failure is kept in memory and, when a path is configured, appended
//! to a JSON-lines file as soon as it is recorded. Each line carries enough
//! context (sweep, asset, start date, full parameter point) to rerun the
//! trial by hand.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::error;

use super::error::{FailureKind, SinkWriteError, TrialFailure};
use super::types::{AssetId, ParameterPoint};

/// A failed trial with its reproduction context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Sweep the trial belonged to.
    pub sweep: String,
    /// Target asset.
    pub asset: AssetId,
    /// Simulation start date.
    pub start_date: NaiveDate,
    /// Full parameter point.
    pub parameters: ParameterPoint,
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl FailureRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(
        sweep: &str,
        asset: &AssetId,
        start_date: NaiveDate,
        parameters: ParameterPoint,
        failure: TrialFailure,
    ) -> Self {
        Self {
            recorded_at: Utc::now(),
            sweep: sweep.to_string(),
            asset: asset.clone(),
            start_date,
            parameters,
            kind: failure.kind,
            message: failure.message,
        }
    }
}

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Error log owned by the collector.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Vec<FailureRecord>,
    file: Option<LogFile>,
}

impl ErrorLog {
    /// Log that only keeps records in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Log that also appends to `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkWriteError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkWriteError::Local {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            records: Vec::new(),
            file: Some(LogFile {
                path,
                writer: BufWriter::new(file),
            }),
        })
    }

    /// Record a failure.
    ///
    /// The record is always retained in memory; an error means only the
    /// file append failed.
    pub fn record(&mut self, record: FailureRecord) -> Result<(), SinkWriteError> {
        error!(
            sweep = %record.sweep,
            asset = %record.asset,
            parameters = %record.parameters,
            kind = record.kind.as_str(),
            cause = %record.message,
            "Trial failed"
        );

        let written = self.append_line(&record);
        self.records.push(record);
        written
    }

    fn append_line(&mut self, record: &FailureRecord) -> Result<(), SinkWriteError> {
        let Some(LogFile { path, writer }) = self.file.as_mut() else {
            return Ok(());
        };

        let local_error = |message: String| SinkWriteError::Local {
            path: path.display().to_string(),
            message,
        };
        let line = serde_json::to_string(record).map_err(|e| local_error(e.to_string()))?;

        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| local_error(e.to_string()))
    }

    /// All recorded failures in arrival order.
    #[must_use]
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the log, returning its records.
    #[must_use]
    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fear: i64) -> FailureRecord {
        FailureRecord::new(
            "eth_condor",
            &AssetId::new("eth"),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            ParameterPoint::new(
                0,
                vec![("fear_and_greed".to_string(), fear), ("volatility".to_string(), 36)],
            ),
            TrialFailure::retrieval("worker panicked"),
        )
    }

    #[test]
    fn in_memory_log_keeps_records() {
        let mut log = ErrorLog::in_memory();
        log.record(record(5)).unwrap();
        log.record(record(6)).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].parameters.get("fear_and_greed"), Some(6));
    }

    #[test]
    fn file_log_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");

        let mut log = ErrorLog::open(&path).unwrap();
        log.record(record(5)).unwrap();
        log.record(record(7)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["parameters"]["fear_and_greed"], 7);
        assert_eq!(lines[0]["kind"], "result_retrieval");
        assert_eq!(lines[0]["asset"], "eth");
        assert_eq!(lines[0]["start_date"], "2020-01-01");
    }

    #[test]
    fn reopening_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");

        ErrorLog::open(&path).unwrap().record(record(5)).unwrap();
        ErrorLog::open(&path).unwrap().record(record(6)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("errors.log");

        assert!(matches!(
            ErrorLog::open(&path),
            Err(SinkWriteError::Local { .. })
        ));
    }
}
