//! Sweep Orchestrator Binary
//!
//! Runs every sweep declared in the config file, one after another.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sweep-orchestrator -- sweep.yaml
//! ```
//!
//! # Environment Variables
//!
//! ## Required (when `remote.enabled`)
//! - `SPREADSHEET_KEY`: Target spreadsheet key
//! - `SERVICE_JSON`: Service-account key JSON
//! - `WORKSHEET_NAME`: Default worksheet; sweeps may set `output.worksheet`
//!
//! ## Optional
//! - `SWEEP_CONFIG`: Config path when no argument is given (default: sweep.yaml)
//! - `RUST_LOG`: Log level (default: from config)

use std::sync::Arc;

use anyhow::{Context, Result};
use sweep_orchestrator::application::ports::RemoteSinkPort;
use sweep_orchestrator::config::{self, Config, DEFAULT_CONFIG_PATH};
use sweep_orchestrator::infrastructure::engine::CommandEngine;
use sweep_orchestrator::infrastructure::sheets::SheetsClient;
use sweep_orchestrator::sweep::TrialEngine;
use sweep_orchestrator::telemetry::init_tracing;
use sweep_orchestrator::SweepOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SWEEP_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = config::load_config(Some(&path))
        .with_context(|| format!("loading configuration from {path}"))?;

    init_tracing(&config.observability.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("initializing tracing")?;

    tracing::info!(config = %path, sweeps = config.sweeps.len(), "Starting sweep orchestrator");

    let orchestrator = build_orchestrator(&config)?;

    for sweep in &config.sweeps {
        let report = orchestrator
            .run(sweep)
            .await
            .with_context(|| format!("running sweep '{}'", sweep.name))?;

        tracing::info!(
            sweep = %report.name,
            total = report.progress.total(),
            significant = report.table.len(),
            insignificant = report.insignificant,
            failed = report.failed(),
            sink_failures = report.sink_failures,
            success_rate = report.success_rate(),
            best = ?report.table.best().map(|row| row.point.to_string()),
            "Sweep summary"
        );
    }

    tracing::info!("All sweeps complete");
    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<SweepOrchestrator> {
    let engine: Arc<dyn TrialEngine> = Arc::new(CommandEngine::new(config.engine.clone()));
    let mut orchestrator = SweepOrchestrator::new(config.run_settings(), engine)
        .context("building worker pool")?;

    let remote = config::require_remote_credentials(&config.remote, |name| {
        std::env::var(name).ok()
    })
    .context("resolving remote sink configuration")?;

    if let Some(sheets) = remote {
        for (sweep, sheets) in config::assign_worksheets(&sheets, &config.sweeps)? {
            tracing::info!(
                sweep = %sweep,
                spreadsheet = %sheets.spreadsheet_key,
                worksheet = %sheets.worksheet,
                "Publishing to remote sheet"
            );
            let client: Arc<dyn RemoteSinkPort> =
                Arc::new(SheetsClient::new(sheets).context("building sheets client")?);
            orchestrator = orchestrator.with_sweep_sink(sweep, client);
        }
    } else {
        tracing::info!("Remote sheet disabled; progress is logged only");
    }

    Ok(orchestrator)
}

/// Load `.env` from the working directory or the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
