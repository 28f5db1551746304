//! Result types for sweep execution.

use std::time::Duration;

use serde::Serialize;

use super::error_log::FailureRecord;
use super::progress::ProgressState;
use super::ranking::{RankMetric, competition_ranks};
use super::types::{CellValue, ParameterPoint, TrialStats};

/// Name of the derived rank column.
pub const RANK_COLUMN: &str = "rank";

/// One significant trial: grid point plus its statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Grid point.
    pub point: ParameterPoint,
    /// Trial statistics.
    pub stats: TrialStats,
}

impl ResultRow {
    /// Flattened cells: point values, then statistics.
    #[must_use]
    pub fn cells(&self) -> Vec<CellValue> {
        self.point
            .values()
            .map(CellValue::Int)
            .chain(self.stats.cells())
            .collect()
    }
}

/// Column names: dimensions, then statistics.
fn base_header(dimensions: &[String]) -> Vec<String> {
    dimensions
        .iter()
        .cloned()
        .chain(TrialStats::COLUMNS.iter().map(|c| (*c).to_string()))
        .collect()
}

/// Append-only table of significant trials, filled during the run.
#[derive(Debug, Clone, Default)]
pub struct AggregatedTable {
    dimensions: Vec<String>,
    rows: Vec<ResultRow>,
}

impl AggregatedTable {
    /// Create an empty table for the given dimensions.
    #[must_use]
    pub const fn new(dimensions: Vec<String>) -> Self {
        Self {
            dimensions,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push(&mut self, row: ResultRow) -> &ResultRow {
        self.rows.push(row);
        &self.rows[self.rows.len() - 1]
    }

    /// Rows in arrival order.
    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names without the rank column.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        base_header(&self.dimensions)
    }

    /// Close the table, ranking it by `rank_by` if given.
    #[must_use]
    pub fn finalize(self, rank_by: Option<RankMetric>) -> FinalTable {
        let ranks = rank_by.map(|metric| {
            let values: Vec<f64> = self.rows.iter().map(|r| metric.value(&r.stats)).collect();
            competition_ranks(&values)
        });

        FinalTable {
            dimensions: self.dimensions,
            rows: self.rows,
            rank_metric: rank_by,
            ranks,
        }
    }
}

/// Table after the run, optionally carrying a rank column.
#[derive(Debug, Clone)]
pub struct FinalTable {
    dimensions: Vec<String>,
    rows: Vec<ResultRow>,
    rank_metric: Option<RankMetric>,
    ranks: Option<Vec<u64>>,
}

impl FinalTable {
    /// Column names, including `rank` when ranked.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        let mut header = base_header(&self.dimensions);
        if self.ranks.is_some() {
            header.push(RANK_COLUMN.to_string());
        }
        header
    }

    /// Rows in arrival order.
    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Ranks aligned with [`Self::rows`], if ranked.
    #[must_use]
    pub fn ranks(&self) -> Option<&[u64]> {
        self.ranks.as_deref()
    }

    /// Metric the table was ranked by.
    #[must_use]
    pub const fn rank_metric(&self) -> Option<RankMetric> {
        self.rank_metric
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of every row, rank appended when ranked.
    pub fn records(&self) -> impl Iterator<Item = Vec<CellValue>> + '_ {
        self.rows.iter().enumerate().map(|(i, row)| {
            let mut cells = row.cells();
            if let Some(ranks) = &self.ranks {
                cells.push(CellValue::Int(ranks[i] as i64));
            }
            cells
        })
    }

    /// Best row by rank, or `None` if unranked or empty.
    #[must_use]
    pub fn best(&self) -> Option<&ResultRow> {
        let ranks = self.ranks.as_ref()?;
        ranks
            .iter()
            .enumerate()
            .min_by_key(|(_, rank)| **rank)
            .map(|(i, _)| &self.rows[i])
    }
}

/// Summary of a finished sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Sweep name.
    pub name: String,
    /// Final table of significant trials.
    pub table: FinalTable,
    /// Every failed trial.
    pub failures: Vec<FailureRecord>,
    /// Final progress.
    pub progress: ProgressState,
    /// Successful trials below the significance floor.
    pub insignificant: u64,
    /// Sink writes that failed during the run.
    pub sink_failures: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl SweepReport {
    /// Successful trials (significant or not).
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.table.len() as u64 + self.insignificant
    }

    /// Failed trials.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Get the success rate.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.progress.total() == 0 {
            0.0
        } else {
            self.succeeded() as f64 / self.progress.total() as f64
        }
    }
}
