//! Parallel parameter sweeps over backtest trials.
//!
//! A sweep runs one trial per point of an integer parameter grid:
//! - The grid is generated up front as a row-major cartesian product
//! - Every trial is dispatched eagerly onto a bounded rayon pool
//! - Outcomes stream back in completion order to a single collector
//! - Insignificant trials are dropped, failed trials go to the error log
//! - Progress and new rows are published on a throttled cadence
//! - The final table is optionally ranked and dumped to CSV
//!
//! # Thread Pool Configuration
//!
//! Each [`WorkerPool`] owns a local rayon pool. `max_threads = 0` sizes it to
//! the number of available cores.
//!
//! # Example
//!
//! ```ignore
//! use sweep_orchestrator::sweep::{RunSettings, SweepOrchestrator};
//!
//! let orchestrator = SweepOrchestrator::new(RunSettings::default(), engine)?
//!     .with_sink(sheets);
//!
//! let report = orchestrator.run(&definition).await?;
//! println!("{} significant rows", report.table.len());
//! ```

mod collector;
mod error;
mod error_log;
mod executor;
mod grid;
mod orchestrator;
mod progress;
mod publisher;
mod ranking;
mod result;
mod runner;
mod types;

pub use collector::{
    Collected, DEFAULT_MIN_TOTAL_POSITIONS, Recorded, ResultCollector, SignificanceFilter,
    SweepContext,
};
pub use error::{FailureKind, SinkWriteError, SweepError, TrialError, TrialFailure};
pub use error_log::{ErrorLog, FailureRecord};
pub use executor::{CompletionStream, WorkerPool, WorkerPoolConfig};
pub use grid::{GridPoints, ParamRange, ParameterGrid, ParameterGridBuilder, RangeConvention};
pub use orchestrator::{Dimension, OutputSpec, RunSettings, SweepDefinition, SweepOrchestrator};
pub use progress::{
    Clock, DEFAULT_BAR_WIDTH, DEFAULT_PUBLISH_INTERVAL, ManualClock, ProgressBar, ProgressState,
    PublishThrottle, SystemClock,
};
pub use publisher::BatchedPublisher;
pub use ranking::{RankMetric, competition_ranks};
pub use result::{AggregatedTable, FinalTable, RANK_COLUMN, ResultRow, SweepReport};
pub use runner::{
    Comparison, EntryCondition, EntryPredicate, HistoryRow, TrialEngine, TrialRequest,
    TrialResponse, TrialRunner,
};
pub use types::{
    AssetId, CellValue, ParameterPoint, StrategyConditions, TrialOutcome, TrialSpec, TrialStats,
};
