//! Trial engine backed by an external program.
//!
//! Each trial spawns the configured program once. The request is written to
//! its stdin as JSON; the last non-empty stdout line must be a JSON object of
//! metric name to number.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sweep::{TrialEngine, TrialError, TrialRequest, TrialResponse};

/// Maximum stderr bytes kept in an engine failure message.
const STDERR_TAIL_BYTES: usize = 2048;

/// How to launch the engine program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEngineConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments passed unchanged (data paths, flags).
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// [`TrialEngine`] running one child process per trial.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: CommandEngineConfig,
}

impl CommandEngine {
    /// Create an engine from its launch configuration.
    #[must_use]
    pub const fn new(config: CommandEngineConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl TrialEngine for CommandEngine {
    fn run_trial(&self, request: &TrialRequest) -> Result<TrialResponse, TrialError> {
        let payload = serde_json::to_vec(request).map_err(|e| TrialError::Engine {
            message: format!("cannot encode request: {e}"),
        })?;

        let mut child = self.command().spawn().map_err(|e| TrialError::Unavailable {
            message: format!("failed to spawn '{}': {e}", self.config.program),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload) {
                Ok(()) => {}
                // The engine may exit without reading its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(TrialError::Unavailable {
                        message: format!("failed to write request: {e}"),
                    });
                }
            }
        }

        let output = child.wait_with_output().map_err(|e| TrialError::Unavailable {
            message: format!("failed to collect engine output: {e}"),
        })?;

        if !output.status.success() {
            return Err(TrialError::Engine {
                message: format!("{}: {}", output.status, stderr_tail(&output.stderr)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| TrialError::MalformedResponse {
                message: "engine produced no output".to_string(),
            })?;

        debug!(trial = %request.name, bytes = output.stdout.len(), "Engine responded");

        serde_json::from_str(line).map_err(|e| TrialError::MalformedResponse {
            message: format!("{e}: {line}"),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
