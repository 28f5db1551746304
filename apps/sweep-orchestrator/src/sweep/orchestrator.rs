//! Sweep orchestration.
//!
//! [`SweepOrchestrator`] wires the grid, worker pool, collector, publisher
//! and output files together for one sweep at a time. All mutable run state
//! lives inside [`SweepOrchestrator::run`]; workers only reach it through the
//! completion stream.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::application::ports::RemoteSinkPort;
use crate::infrastructure::output::write_table;

use super::collector::{Recorded, ResultCollector, SignificanceFilter, SweepContext};
use super::error::SweepError;
use super::error_log::ErrorLog;
use super::executor::{WorkerPool, WorkerPoolConfig};
use super::grid::{ParamRange, ParameterGrid, RangeConvention};
use super::progress::{Clock, DEFAULT_BAR_WIDTH, DEFAULT_PUBLISH_INTERVAL, ProgressBar, SystemClock};
use super::publisher::BatchedPublisher;
use super::ranking::RankMetric;
use super::result::SweepReport;
use super::runner::{Comparison, TrialEngine, TrialRunner};
use super::types::{AssetId, StrategyConditions, TrialSpec};

/// One grid dimension and the way its value gates entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Name, bounds and step.
    #[serde(flatten)]
    pub range: ParamRange,
    /// Side of the threshold the history value must lie on.
    #[serde(default)]
    pub comparison: Comparison,
}

/// Where a sweep's final table goes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Local CSV dump of the whole table.
    pub csv_path: Option<PathBuf>,
    /// Metric to rank by. No rank column when absent.
    #[serde(default)]
    pub rank_by: Option<RankMetric>,
    /// Remote worksheet for this sweep. The run's default worksheet when absent.
    #[serde(default)]
    pub worksheet: Option<String>,
}

/// A fully declared sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDefinition {
    /// Unique sweep name.
    pub name: String,
    /// Target asset.
    pub asset: AssetId,
    /// Simulation start date.
    pub start_date: NaiveDate,
    /// Strategy conditions shared by every trial.
    pub strategy: StrategyConditions,
    /// Bound convention for every dimension.
    #[serde(default)]
    pub bounds: RangeConvention,
    /// Grid dimensions, outermost first.
    pub dimensions: Vec<Dimension>,
    /// Output files.
    #[serde(default)]
    pub output: OutputSpec,
}

impl SweepDefinition {
    /// Build the parameter grid.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::InvalidRange`] if any dimension is malformed.
    pub fn grid(&self) -> Result<ParameterGrid, SweepError> {
        let ranges: Vec<ParamRange> = self.dimensions.iter().map(|d| d.range.clone()).collect();
        ParameterGrid::from_ranges(&ranges, self.bounds)
    }

    /// Entry comparison per dimension.
    #[must_use]
    pub fn comparisons(&self) -> BTreeMap<String, Comparison> {
        self.dimensions
            .iter()
            .map(|d| (d.range.name.clone(), d.comparison))
            .collect()
    }
}

/// Immutable settings shared by every sweep of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Worker pool sizing.
    pub workers: WorkerPoolConfig,
    /// Minimum time between two publications.
    pub publish_interval: Duration,
    /// Progress bar width.
    pub bar_width: usize,
    /// Significance floor.
    pub significance: SignificanceFilter,
    /// JSON-lines error log. In-memory only when absent.
    pub error_log_path: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: WorkerPoolConfig::default(),
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            bar_width: DEFAULT_BAR_WIDTH,
            significance: SignificanceFilter::default(),
            error_log_path: None,
        }
    }
}

/// Runs sweeps against a trial engine and an optional remote sink.
pub struct SweepOrchestrator {
    settings: RunSettings,
    pool: WorkerPool,
    engine: Arc<dyn TrialEngine>,
    sink: Option<Arc<dyn RemoteSinkPort>>,
    sweep_sinks: HashMap<String, Arc<dyn RemoteSinkPort>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SweepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepOrchestrator")
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .field("remote", &self.sink.is_some())
            .field("sweep_sinks", &self.sweep_sinks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SweepOrchestrator {
    /// Create an orchestrator with its worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::ThreadPool`] if the pool cannot be built.
    pub fn new(settings: RunSettings, engine: Arc<dyn TrialEngine>) -> Result<Self, SweepError> {
        let pool = WorkerPool::new(settings.workers)?;
        Ok(Self {
            settings,
            pool,
            engine,
            sink: None,
            sweep_sinks: HashMap::new(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Publish progress and rows to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RemoteSinkPort>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publish the sweep named `sweep` to `sink` instead of the default sink.
    #[must_use]
    pub fn with_sweep_sink(mut self, sweep: impl Into<String>, sink: Arc<dyn RemoteSinkPort>) -> Self {
        self.sweep_sinks.insert(sweep.into(), sink);
        self
    }

    /// Use `clock` for publication throttling.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Settings this orchestrator was built with.
    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run one sweep to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::InvalidRange`] before any trial runs if the grid
    /// is malformed. Trial and sink failures never abort the run; they are
    /// reported in the returned [`SweepReport`].
    pub async fn run(&self, sweep: &SweepDefinition) -> Result<SweepReport, SweepError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sweep_run",
            %run_id,
            sweep = %sweep.name,
            asset = %sweep.asset
        );
        self.run_sweep(sweep).instrument(span).await
    }

    async fn run_sweep(&self, sweep: &SweepDefinition) -> Result<SweepReport, SweepError> {
        let started = self.clock.now();
        let grid = sweep.grid()?;

        let specs: Vec<TrialSpec> = grid
            .points()
            .map(|point| TrialSpec {
                point,
                strategy: sweep.strategy.clone(),
                asset: sweep.asset.clone(),
                start_date: sweep.start_date,
            })
            .collect();
        let total = specs.len() as u64;

        info!(
            trials = total,
            dimensions = ?grid.dimension_names(),
            threads = self.pool.effective_thread_count(),
            "Starting sweep"
        );

        let mut sink_failures = 0;
        let error_log = self.open_error_log(&mut sink_failures);

        let mut collector = ResultCollector::new(
            SweepContext {
                sweep: sweep.name.clone(),
                asset: sweep.asset.clone(),
                start_date: sweep.start_date,
            },
            self.settings.significance,
            grid.dimension_names().to_vec(),
            total,
            error_log,
        );

        let mut publisher = BatchedPublisher::new(
            self.sink_for(&sweep.name),
            self.settings.publish_interval,
            ProgressBar::new(self.settings.bar_width),
            started,
        );
        publisher.initialize(total, &collector.table().header()).await;

        let runner = Arc::new(TrialRunner::new(Arc::clone(&self.engine), sweep.comparisons()));
        let mut completions = self.pool.dispatch(runner, specs);

        while let Some(outcome) = completions.next().await {
            let row = match collector.record(outcome) {
                Recorded::Appended(cells) => Some(cells),
                Recorded::Insignificant | Recorded::Failed => None,
            };
            publisher
                .on_progress(row, &collector.progress(), self.clock.now())
                .await;
        }
        publisher.finish(&collector.progress()).await;
        sink_failures += publisher.failures();

        let collected = collector.finish();
        sink_failures += collected.log_write_failures;
        let table = collected.table.finalize(sweep.output.rank_by);

        if let Some(path) = &sweep.output.csv_path {
            match write_table(path, &table) {
                Ok(()) => info!(path = %path.display(), rows = table.len(), "Wrote result table"),
                Err(e) => {
                    counter!("sweep_sink_failures_total", "sink" => "csv").increment(1);
                    warn!(error = %e, "Failed to write result table");
                    sink_failures += 1;
                }
            }
        }

        let report = SweepReport {
            name: sweep.name.clone(),
            table,
            failures: collected.error_log.into_records(),
            progress: collected.progress,
            insignificant: collected.insignificant,
            sink_failures,
            elapsed: self.clock.now().saturating_duration_since(started),
        };

        info!(
            succeeded = report.succeeded(),
            significant = report.table.len(),
            failed = report.failed(),
            sink_failures = report.sink_failures,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Sweep complete"
        );

        Ok(report)
    }

    fn sink_for(&self, sweep: &str) -> Option<Arc<dyn RemoteSinkPort>> {
        self.sweep_sinks
            .get(sweep)
            .or(self.sink.as_ref())
            .cloned()
    }

    fn open_error_log(&self, sink_failures: &mut u64) -> ErrorLog {
        let Some(path) = &self.settings.error_log_path else {
            return ErrorLog::in_memory();
        };

        ErrorLog::open(path).unwrap_or_else(|e| {
            counter!("sweep_sink_failures_total", "sink" => "error_log").increment(1);
            warn!(error = %e, "Cannot open error log; failures kept in memory only");
            *sink_failures += 1;
            ErrorLog::in_memory()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::error::TrialError;
    use crate::sweep::runner::{MockTrialEngine, TrialResponse};

    fn definition(dimensions: Vec<Dimension>) -> SweepDefinition {
        SweepDefinition {
            name: "unit".to_string(),
            asset: AssetId::new("btc"),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            strategy: StrategyConditions {
                open_price: 0.0,
                period_days: 14,
                profit_below_price_factor: 0.13,
                profit_above_price_factor: 0.13,
                liquidate_below_price_factor: 0.23,
                liquidate_above_price_factor: 0.23,
            },
            bounds: RangeConvention::HalfOpen,
            dimensions,
            output: OutputSpec::default(),
        }
    }

    fn dimension(name: &str, low: i64, high: i64) -> Dimension {
        Dimension {
            range: ParamRange::new(name, low, high),
            comparison: Comparison::Below,
        }
    }

    fn summary(positions: f64) -> TrialResponse {
        TrialResponse::new(BTreeMap::from([
            ("percent_profitable".to_string(), 0.55),
            ("total_positions".to_string(), positions),
            ("percent_liquidated".to_string(), 0.05),
            ("percent_unprofitable".to_string(), 0.4),
        ]))
    }

    #[tokio::test]
    async fn invalid_range_aborts_before_dispatch() {
        let mut engine = MockTrialEngine::new();
        engine.expect_run_trial().never();
        let orchestrator = SweepOrchestrator::new(RunSettings::default(), Arc::new(engine)).unwrap();

        let result = orchestrator
            .run(&definition(vec![dimension("fear_and_greed", 7, 5)]))
            .await;

        assert!(matches!(result, Err(SweepError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn engine_errors_are_reported_not_raised() {
        let mut engine = MockTrialEngine::new();
        engine.expect_run_trial().times(2).returning(|request| {
            if request.name == "fear_and_greed: 5" {
                Err(TrialError::Engine {
                    message: "no data".to_string(),
                })
            } else {
                Ok(summary(150.0))
            }
        });
        let orchestrator = SweepOrchestrator::new(RunSettings::default(), Arc::new(engine)).unwrap();

        let report = orchestrator
            .run(&definition(vec![dimension("fear_and_greed", 5, 7)]))
            .await
            .unwrap();

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].parameters.get("fear_and_greed"), Some(5));
        assert!(report.progress.is_complete());
    }

    #[test]
    fn dimension_deserializes_flat() {
        let yaml = "name: volatility\nlow: 36\nhigh: 38\ncomparison: above\n";
        let d: Dimension = serde_yaml_bw::from_str(yaml).unwrap();

        assert_eq!(d.range, ParamRange::new("volatility", 36, 38));
        assert_eq!(d.comparison, Comparison::Above);
    }
}
