//! Single consumer of trial outcomes.
//!
//! The collector owns the result table, the error log, and the progress
//! state. Outcomes reach it one at a time from the completion stream.

use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error_log::{ErrorLog, FailureRecord};
use super::progress::ProgressState;
use super::result::{AggregatedTable, ResultRow};
use super::types::{AssetId, CellValue, TrialOutcome, TrialStats};

/// Default significance floor on the number of positions.
pub const DEFAULT_MIN_TOTAL_POSITIONS: u64 = 100;

/// Decides whether a successful trial is large enough to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificanceFilter {
    /// A trial is significant only with strictly more positions than this.
    pub min_total_positions: u64,
}

impl Default for SignificanceFilter {
    fn default() -> Self {
        Self {
            min_total_positions: DEFAULT_MIN_TOTAL_POSITIONS,
        }
    }
}

impl SignificanceFilter {
    /// Whether `stats` clears the floor.
    #[must_use]
    pub const fn is_significant(&self, stats: &TrialStats) -> bool {
        stats.total_positions > self.min_total_positions
    }
}

/// Identity of the sweep whose outcomes are collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepContext {
    /// Sweep name.
    pub sweep: String,
    /// Target asset.
    pub asset: AssetId,
    /// Simulation start date.
    pub start_date: NaiveDate,
}

/// What the collector did with an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// Significant success; carries the row cells to publish.
    Appended(Vec<CellValue>),
    /// Success below the significance floor.
    Insignificant,
    /// Failure, written to the error log.
    Failed,
}

/// Everything the collector accumulated over a run.
#[derive(Debug)]
pub struct Collected {
    /// Significant rows.
    pub table: AggregatedTable,
    /// Failures.
    pub error_log: ErrorLog,
    /// Final progress.
    pub progress: ProgressState,
    /// Successes below the floor.
    pub insignificant: u64,
    /// Error-log appends that failed.
    pub log_write_failures: u64,
}

/// Consumes outcomes and accumulates run state.
#[derive(Debug)]
pub struct ResultCollector {
    context: SweepContext,
    filter: SignificanceFilter,
    table: AggregatedTable,
    error_log: ErrorLog,
    progress: ProgressState,
    insignificant: u64,
    log_write_failures: u64,
}

impl ResultCollector {
    /// Create a collector expecting `total` outcomes.
    #[must_use]
    pub const fn new(
        context: SweepContext,
        filter: SignificanceFilter,
        dimensions: Vec<String>,
        total: u64,
        error_log: ErrorLog,
    ) -> Self {
        Self {
            context,
            filter,
            table: AggregatedTable::new(dimensions),
            error_log,
            progress: ProgressState::new(total),
            insignificant: 0,
            log_write_failures: 0,
        }
    }

    /// Consume one outcome and advance progress by one.
    pub fn record(&mut self, outcome: TrialOutcome) -> Recorded {
        let recorded = match outcome {
            TrialOutcome::Success { point, stats } => {
                if self.filter.is_significant(&stats) {
                    counter!("sweep_trials_total", "outcome" => "significant").increment(1);
                    let row = self.table.push(ResultRow { point, stats });
                    Recorded::Appended(row.cells())
                } else {
                    counter!("sweep_trials_total", "outcome" => "insignificant").increment(1);
                    debug!(
                        parameters = %point,
                        total_positions = stats.total_positions,
                        floor = self.filter.min_total_positions,
                        "Trial below significance floor"
                    );
                    self.insignificant += 1;
                    Recorded::Insignificant
                }
            }
            TrialOutcome::Failure { point, failure } => {
                counter!("sweep_trials_total", "outcome" => "failed").increment(1);
                let record = FailureRecord::new(
                    &self.context.sweep,
                    &self.context.asset,
                    self.context.start_date,
                    point,
                    failure,
                );
                if let Err(e) = self.error_log.record(record) {
                    counter!("sweep_sink_failures_total", "sink" => "error_log").increment(1);
                    warn!(error = %e, "Failed to persist error log entry; kept in memory");
                    self.log_write_failures += 1;
                }
                Recorded::Failed
            }
        };

        if !self.progress.advance() {
            warn!(
                total = self.progress.total(),
                "Received more outcomes than dispatched trials"
            );
        }
        recorded
    }

    /// Current progress.
    #[must_use]
    pub const fn progress(&self) -> ProgressState {
        self.progress
    }

    /// Rows collected so far.
    #[must_use]
    pub const fn table(&self) -> &AggregatedTable {
        &self.table
    }

    /// Failures recorded so far.
    #[must_use]
    pub const fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Finish collection.
    #[must_use]
    pub fn finish(self) -> Collected {
        Collected {
            table: self.table,
            error_log: self.error_log,
            progress: self.progress,
            insignificant: self.insignificant,
            log_write_failures: self.log_write_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::error::TrialFailure;
    use crate::sweep::types::ParameterPoint;

    fn collector(total: u64) -> ResultCollector {
        ResultCollector::new(
            SweepContext {
                sweep: "test".to_string(),
                asset: AssetId::new("btc"),
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            },
            SignificanceFilter::default(),
            vec!["fear_and_greed".to_string()],
            total,
            ErrorLog::in_memory(),
        )
    }

    fn point(index: usize) -> ParameterPoint {
        ParameterPoint::new(index, vec![("fear_and_greed".to_string(), index as i64)])
    }

    fn success(index: usize, positions: u64) -> TrialOutcome {
        TrialOutcome::Success {
            point: point(index),
            stats: TrialStats {
                percent_profitable: 0.5,
                total_positions: positions,
                percent_liquidated: 0.1,
                percent_unprofitable: 0.4,
            },
        }
    }

    #[test]
    fn significant_success_is_appended() {
        let mut c = collector(1);

        let recorded = c.record(success(0, 101));

        assert!(matches!(recorded, Recorded::Appended(ref cells) if cells.len() == 5));
        assert_eq!(c.table().len(), 1);
        assert!(c.progress().is_complete());
    }

    #[test]
    fn floor_is_exclusive() {
        let mut c = collector(2);

        assert_eq!(c.record(success(0, 100)), Recorded::Insignificant);
        assert_eq!(c.record(success(1, 0)), Recorded::Insignificant);

        let collected = c.finish();
        assert!(collected.table.is_empty());
        assert!(collected.error_log.is_empty());
        assert_eq!(collected.insignificant, 2);
        assert_eq!(collected.progress.completed(), 2);
    }

    #[test]
    fn failure_goes_to_error_log_only() {
        let mut c = collector(2);

        c.record(TrialOutcome::Failure {
            point: point(0),
            failure: TrialFailure::retrieval("lost"),
        });
        c.record(success(1, 500));

        assert_eq!(c.table().len(), 1);
        assert_eq!(c.error_log().len(), 1);
        assert_eq!(c.error_log().records()[0].parameters, point(0));
        assert_eq!(c.error_log().records()[0].asset.as_str(), "btc");
        assert_eq!(c.progress().completed(), 2);
    }

    #[test]
    fn custom_floor() {
        let mut c = ResultCollector::new(
            SweepContext {
                sweep: "test".to_string(),
                asset: AssetId::new("btc"),
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            },
            SignificanceFilter {
                min_total_positions: 10,
            },
            vec!["fear_and_greed".to_string()],
            1,
            ErrorLog::in_memory(),
        );

        assert!(matches!(c.record(success(0, 11)), Recorded::Appended(_)));
    }

    #[test]
    fn progress_never_exceeds_total() {
        let mut c = collector(1);
        c.record(success(0, 200));
        c.record(success(1, 200));

        assert_eq!(c.progress().completed(), 1);
    }
}
