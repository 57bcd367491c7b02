use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a single check did not produce a payload.
///
/// Only ever stored inside a host report; it never aborts the host or the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckError {
    #[error("remote operation failed: {message}")]
    Remote { message: String },
    #[error("check exceeded its {timeout_ms}ms timeout")]
    Timeout { timeout_ms: u64 },
    #[error("check panicked: {message}")]
    Panicked { message: String },
    #[error("run cancelled before the check started")]
    Cancelled,
}

impl CheckError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote {
            message: format!("{err:#}"),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout {
            timeout_ms: limit.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The coverage invariant was broken: every input host must be reported exactly once.
///
/// This is a defect signal, not an operational failure. A run that produces it is aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("host {0} is missing from the fleet report")]
    MissingHost(String),
    #[error("host {0} is reported more than once")]
    DuplicateHost(String),
    #[error("host {0} was reported but is not part of the input fleet")]
    UnexpectedHost(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("no configuration directory available")]
    PathUnavailable,
}
