//! Trial execution boundary.
//!
//! The simulation engine is external. [`TrialEngine`] is the port it is
//! reached through; [`TrialRunner`] turns a [`TrialSpec`] into an engine
//! request and the engine's answer into a [`TrialOutcome`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{TrialError, TrialFailure};
use super::types::{AssetId, ParameterPoint, StrategyConditions, TrialOutcome, TrialSpec, TrialStats};

/// Direction a history value must lie relative to a threshold to allow entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Value strictly below the threshold.
    #[default]
    Below,
    /// Value strictly above the threshold.
    Above,
}

/// One row of the historical data an engine evaluates entries against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Row date.
    pub date: NaiveDate,
    /// Named numeric columns (e.g. `fear_and_greed`, `volatility`).
    pub values: BTreeMap<String, f64>,
}

/// Threshold on a single history column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCondition {
    /// History column the condition reads.
    pub column: String,
    /// Required side of the threshold.
    pub comparison: Comparison,
    /// Threshold value, taken from the grid point.
    pub threshold: f64,
}

impl EntryCondition {
    fn holds(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::Below => value < self.threshold,
            Comparison::Above => value > self.threshold,
        }
    }
}

/// Predicate deciding whether a position may be opened, given a window of history.
///
/// Only the latest row of the window is inspected. An empty window, or a
/// row missing one of the columns, never allows entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPredicate {
    conditions: Vec<EntryCondition>,
}

impl EntryPredicate {
    /// Create a predicate requiring every condition to hold.
    #[must_use]
    pub const fn new(conditions: Vec<EntryCondition>) -> Self {
        Self { conditions }
    }

    /// Conditions in dimension order.
    #[must_use]
    pub fn conditions(&self) -> &[EntryCondition] {
        &self.conditions
    }

    /// Evaluate against a history window.
    #[must_use]
    pub fn evaluate(&self, window: &[HistoryRow]) -> bool {
        let Some(latest) = window.last() else {
            return false;
        };

        self.conditions.iter().all(|condition| {
            latest
                .values
                .get(&condition.column)
                .is_some_and(|value| condition.holds(*value))
        })
    }
}

/// A request to run one trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRequest {
    /// Human-readable trial name.
    pub name: String,
    /// Strategy conditions.
    pub strategy: StrategyConditions,
    /// Target asset.
    pub asset: AssetId,
    /// Entry predicate derived from the grid point.
    pub entry: EntryPredicate,
    /// Simulation start date.
    pub start_date: NaiveDate,
}

/// Engine answer for one trial.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct TrialResponse {
    summary: BTreeMap<String, f64>,
}

impl TrialResponse {
    /// Wrap a summary-statistics mapping.
    #[must_use]
    pub const fn new(summary: BTreeMap<String, f64>) -> Self {
        Self { summary }
    }

    /// Named summary metrics.
    #[must_use]
    pub const fn summary_stats(&self) -> &BTreeMap<String, f64> {
        &self.summary
    }
}

/// Port to the external simulation engine.
///
/// Implementations are called concurrently from worker threads and must not
/// share mutable state between calls.
#[cfg_attr(test, mockall::automock)]
pub trait TrialEngine: Send + Sync {
    /// Run one trial to completion.
    fn run_trial(&self, request: &TrialRequest) -> Result<TrialResponse, TrialError>;
}

impl<T: TrialEngine + ?Sized> TrialEngine for std::sync::Arc<T> {
    fn run_trial(&self, request: &TrialRequest) -> Result<TrialResponse, TrialError> {
        (**self).run_trial(request)
    }
}

/// Wraps a [`TrialEngine`] and converts specs to outcomes.
#[derive(Debug)]
pub struct TrialRunner<E> {
    engine: E,
    comparisons: BTreeMap<String, Comparison>,
}

impl<E: TrialEngine> TrialRunner<E> {
    /// Create a runner. Dimensions without an explicit comparison use [`Comparison::Below`].
    #[must_use]
    pub const fn new(engine: E, comparisons: BTreeMap<String, Comparison>) -> Self {
        Self {
            engine,
            comparisons,
        }
    }

    /// Build the entry predicate for a grid point.
    #[must_use]
    pub fn entry_predicate(&self, point: &ParameterPoint) -> EntryPredicate {
        EntryPredicate::new(
            point
                .iter()
                .map(|(name, value)| EntryCondition {
                    column: name.to_string(),
                    comparison: self.comparisons.get(name).copied().unwrap_or_default(),
                    threshold: value as f64,
                })
                .collect(),
        )
    }

    /// Execute one trial. Engine errors become a failed outcome.
    pub fn run(&self, spec: &TrialSpec) -> TrialOutcome {
        let request = TrialRequest {
            name: spec.point.to_string(),
            strategy: spec.strategy.clone(),
            asset: spec.asset.clone(),
            entry: self.entry_predicate(&spec.point),
            start_date: spec.start_date,
        };

        let result = self
            .engine
            .run_trial(&request)
            .and_then(|response| TrialStats::from_summary(response.summary_stats()));

        match result {
            Ok(stats) => {
                debug!(
                    trial = %request.name,
                    total_positions = stats.total_positions,
                    percent_profitable = stats.percent_profitable,
                    "Trial completed"
                );
                TrialOutcome::Success {
                    point: spec.point.clone(),
                    stats,
                }
            }
            Err(e) => {
                debug!(trial = %request.name, error = %e, "Trial failed");
                TrialOutcome::Failure {
                    point: spec.point.clone(),
                    failure: TrialFailure::execution(&e),
                }
            }
        }
    }
}
