//! Configuration module for the sweep orchestrator.
//!
//! Loads the YAML run file, interpolates environment variables, and
//! validates everything before any trial is dispatched.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sweep_orchestrator::config::load_config;
//!
//! // Load from default path (sweep.yaml)
//! let config = load_config(None)?;
//!
//! for sweep in &config.sweeps {
//!     println!("{}: {} dimensions", sweep.name, sweep.dimensions.len());
//! }
//! ```

mod observability;
mod publishing;
mod remote;
mod validation;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::engine::CommandEngineConfig;
use crate::sweep::{RunSettings, SignificanceFilter, SweepDefinition, WorkerPoolConfig};

pub use observability::{LOG_FORMATS, LoggingConfig, ObservabilityConfig};
pub use publishing::{ErrorLogConfig, PublishingConfig};
pub use remote::RemoteConfig;
pub use validation::{
    SERVICE_JSON_VAR, SPREADSHEET_KEY_VAR, WORKSHEET_NAME_VAR, assign_worksheets,
    require_remote_credentials,
};

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "sweep.yaml";

/// Upper bound on an explicit worker count.
const MAX_WORKER_THREADS: usize = 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Service credential could not be parsed.
    #[error("Invalid service credential: {0}")]
    InvalidCredential(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Trial engine program.
    pub engine: CommandEngineConfig,
    /// Worker pool sizing.
    #[serde(default)]
    pub workers: WorkerPoolConfig,
    /// Progress publication cadence.
    #[serde(default)]
    pub publishing: PublishingConfig,
    /// Significance floor.
    #[serde(default)]
    pub significance: SignificanceFilter,
    /// Remote sheet sink.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Error log file.
    #[serde(default)]
    pub error_log: ErrorLogConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Sweeps, run in order.
    pub sweeps: Vec<SweepDefinition>,
}

impl Config {
    /// Settings shared by every sweep of the run.
    #[must_use]
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            workers: self.workers,
            publish_interval: self.publishing.interval(),
            bar_width: self.publishing.bar_width,
            significance: self.significance,
            error_log_path: Some(self.error_log.path.clone()),
        }
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to [`DEFAULT_CONFIG_PATH`].
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_with(&contents, |name| std::env::var(name).ok())
}

/// Load configuration from a YAML string, resolving variables through `lookup`.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_with<F>(yaml: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let interpolated = interpolate_env_with(yaml, lookup);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate variables in a string using `lookup`.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
pub fn interpolate_env_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match lookup(&cap[1]) {
            Some(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.program.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.program must not be empty".to_string(),
        ));
    }

    if config.workers.max_threads > MAX_WORKER_THREADS {
        return Err(ConfigError::ValidationError(format!(
            "workers.max_threads must be at most {MAX_WORKER_THREADS}"
        )));
    }

    if config.publishing.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "publishing.interval_secs must be positive".to_string(),
        ));
    }

    if config.publishing.bar_width == 0 {
        return Err(ConfigError::ValidationError(
            "publishing.bar_width must be positive".to_string(),
        ));
    }

    if !LOG_FORMATS.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {LOG_FORMATS:?}"
        )));
    }

    if config.sweeps.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one sweep must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for sweep in &config.sweeps {
        if !names.insert(sweep.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate sweep name '{}'",
                sweep.name
            )));
        }

        if sweep
            .output
            .csv_path
            .as_ref()
            .is_none_or(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "sweep '{}' needs output.csv_path",
                sweep.name
            )));
        }

        sweep
            .grid()
            .map_err(|e| ConfigError::ValidationError(format!("sweep '{}': {e}", sweep.name)))?;
    }

    Ok(())
}
