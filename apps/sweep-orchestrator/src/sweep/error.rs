//! Error types for parameter sweep operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors from sweep setup. Nothing here is raised once trials are running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// A declared parameter range is empty, inverted, or otherwise malformed.
    #[error("Invalid range for parameter '{name}': {reason}")]
    InvalidRange {
        /// Parameter name.
        name: String,
        /// Why the range was rejected.
        reason: String,
    },

    /// Worker pool initialization failed.
    #[error("Failed to initialize worker pool: {message}")]
    ThreadPool {
        /// Error message.
        message: String,
    },
}

/// Error raised by the trial engine while executing one trial.
///
/// Always recovered locally into a failed outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrialError {
    /// The engine reported a failure.
    #[error("Trial engine failed: {message}")]
    Engine {
        /// Error message.
        message: String,
    },

    /// The engine could not be started or talked to.
    #[error("Trial engine unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// The engine's response could not be decoded.
    #[error("Malformed trial response: {message}")]
    MalformedResponse {
        /// Error message.
        message: String,
    },

    /// A required summary metric was absent from the response.
    #[error("Trial response is missing metric '{metric}'")]
    MissingMetric {
        /// Metric name.
        metric: String,
    },
}

/// Why a trial produced no statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The trial itself raised during execution.
    TrialExecution,
    /// The trial's outcome could not be retrieved from the worker pool.
    ResultRetrieval,
}

impl FailureKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TrialExecution => "trial_execution",
            Self::ResultRetrieval => "result_retrieval",
        }
    }
}

/// Failure attached to a failed trial outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl TrialFailure {
    /// Failure raised by the trial engine.
    #[must_use]
    pub fn execution(error: &TrialError) -> Self {
        Self {
            kind: FailureKind::TrialExecution,
            message: error.to_string(),
        }
    }

    /// Failure to retrieve an outcome from the pool.
    #[must_use]
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ResultRetrieval,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Failure writing to an output sink. Collected rows are never discarded on this error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkWriteError {
    /// Could not reach the remote sink.
    #[error("Remote sink connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// The remote sink rejected the request.
    #[error("Remote sink rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// No bearer token could be obtained for the remote sink.
    #[error("Remote sink authentication failed: {message}")]
    Auth {
        /// Error message.
        message: String,
    },

    /// Writing a local file failed.
    #[error("Failed to write '{path}': {message}")]
    Local {
        /// Output path.
        path: String,
        /// Error message.
        message: String,
    },
}
