// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::items_after_statements,
        clippy::literal_string_with_formatting_args
    )
)]

//! Sweep Orchestrator - Parallel Backtest Parameter Sweeps
//!
//! Runs one backtest trial per point of an integer parameter grid on a
//! bounded worker pool, keeps only statistically significant results, and
//! publishes progress and rows to a remote sheet while the sweep runs.
//!
//! # Architecture (Hexagonal)
//!
//! - **Sweep**: Grid, worker pool, collector, progress, ranking, orchestration
//!   - `TrialEngine` is the port to the external simulation engine
//! - **Application**: Port definitions
//!   - `RemoteSinkPort`: progress and row publication
//! - **Infrastructure**: Adapters
//!   - `engine`: child-process trial engine
//!   - `sheets`: Sheets values REST client
//!   - `output`: local CSV dump
//! - **Config**: YAML configuration with environment interpolation

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Sweep core - grid, execution, collection, publication.
pub mod sweep;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Configuration loading and validation.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;

pub use sweep::{SweepDefinition, SweepError, SweepOrchestrator, SweepReport};
