//! # Fleet Report Model
//!
//! The normalized shapes produced by a fleet run:
//! * [`HostReport`] for every host whose checks were attempted.
//! * [`FailureRecord`] for every host that yields no per-check results.
//! * [`FleetReport`] tying both together with topology findings and summary counts.
//!
//! Every type here serializes to JSON so the rendering side can consume it as-is.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckError;
use crate::host::Host;

/// Outcome of the two independent reachability probes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReachabilityStatus {
    pub network: bool,
    pub management: bool,
}

impl ReachabilityStatus {
    pub fn new(network: bool, management: bool) -> Self {
        Self {
            network,
            management,
        }
    }

    /// A host is eligible for checks only when both probes passed.
    pub fn is_reachable(&self) -> bool {
        self.network && self.management
    }

    /// The failure kind that applies when the host is not reachable.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match (self.network, self.management) {
            (false, _) => Some(FailureKind::Unreachable),
            (true, false) => Some(FailureKind::ManagementUnavailable),
            (true, true) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckResult {
    Success { payload: Value },
    Skipped { reason: String },
    Failed { error: CheckError },
}

impl CheckResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: CheckError) -> Self {
        Self::Failed { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn error(&self) -> Option<&CheckError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// One named entry of a host's ordered check mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub result: CheckResult,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CheckTally {
    pub fn record(&mut self, result: &CheckResult) {
        match result {
            CheckResult::Success { .. } => self.succeeded += 1,
            CheckResult::Skipped { .. } => self.skipped += 1,
            CheckResult::Failed { .. } => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: CheckTally) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Coarse per-host classification used by the report's summary section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostHealth {
    FullyChecked,
    PartiallyFailed,
    Unreachable,
    /// Both probes passed but no remote session could be opened.
    SessionFailed,
    Ignored,
    Cancelled,
}

impl fmt::Display for HostHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostHealth::FullyChecked => write!(f, "fully checked"),
            HostHealth::PartiallyFailed => write!(f, "partially failed"),
            HostHealth::Unreachable => write!(f, "unreachable"),
            HostHealth::SessionFailed => write!(f, "session failed"),
            HostHealth::Ignored => write!(f, "ignored"),
            HostHealth::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-check results of one reachable host, with its tally and health kept in step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostReport {
    pub host: Host,
    pub reachability: ReachabilityStatus,
    pub checks: Vec<CheckOutcome>,
    tally: CheckTally,
    health: HostHealth,
}

impl HostReport {
    pub fn new(host: Host, reachability: ReachabilityStatus) -> Self {
        Self {
            host,
            reachability,
            checks: Vec::new(),
            tally: CheckTally::default(),
            health: HostHealth::FullyChecked,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, result: CheckResult, elapsed_ms: u64) {
        self.tally.record(&result);
        if result.is_failed() {
            self.health = HostHealth::PartiallyFailed;
        }
        self.checks.push(CheckOutcome {
            name: name.into(),
            result,
            elapsed_ms,
        });
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks
            .iter()
            .find(|outcome| outcome.name == name)
            .map(|outcome| &outcome.result)
    }

    /// Rebuilds tally and health from `checks`, for reports whose checks were edited in place.
    pub fn recount(&mut self) {
        let mut tally = CheckTally::default();
        for outcome in &self.checks {
            tally.record(&outcome.result);
        }
        self.tally = tally;
        // Skipped checks are not failures; only a `Failed` result degrades the host.
        self.health = if tally.failed > 0 {
            HostHealth::PartiallyFailed
        } else {
            HostHealth::FullyChecked
        };
    }

    pub fn tally(&self) -> CheckTally {
        self.tally
    }

    pub fn health(&self) -> HostHealth {
        self.health
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Listed in the ignore list or excluded by topology; never probed.
    Ignored,
    /// Network liveness probe failed.
    Unreachable,
    /// Network answered but the remote-management endpoint did not.
    ManagementUnavailable,
    /// Both probes passed but the shared remote session could not be opened.
    SessionSetupFailed,
    /// The run was interrupted before this host's pipeline started.
    Cancelled,
    /// The host pipeline terminated abnormally.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Ignored => write!(f, "ignored"),
            FailureKind::Unreachable => write!(f, "unreachable"),
            FailureKind::ManagementUnavailable => write!(f, "management unavailable"),
            FailureKind::SessionSetupFailed => write!(f, "session setup failed"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub host: Host,
    pub kind: FailureKind,
    /// `None` when the host was never probed.
    pub reachability: Option<ReachabilityStatus>,
    pub error: Option<String>,
}

impl FailureRecord {
    pub fn ignored(host: Host) -> Self {
        Self {
            host,
            kind: FailureKind::Ignored,
            reachability: None,
            error: None,
        }
    }

    pub fn cancelled(host: Host) -> Self {
        Self {
            host,
            kind: FailureKind::Cancelled,
            reachability: None,
            error: None,
        }
    }

    /// Record for a host that failed one of the reachability probes.
    ///
    /// Returns `None` when the status is actually reachable.
    pub fn unreachable(host: Host, reachability: ReachabilityStatus) -> Option<Self> {
        reachability.failure_kind().map(|kind| Self {
            host,
            kind,
            reachability: Some(reachability),
            error: None,
        })
    }

    pub fn session_failed(
        host: Host,
        reachability: ReachabilityStatus,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            host,
            kind: FailureKind::SessionSetupFailed,
            reachability: Some(reachability),
            error: Some(format!("{error:#}")),
        }
    }

    pub fn aborted(host: Host, error: impl fmt::Display) -> Self {
        Self {
            host,
            kind: FailureKind::Aborted,
            reachability: None,
            error: Some(error.to_string()),
        }
    }

    pub fn health(&self) -> HostHealth {
        match self.kind {
            FailureKind::Ignored => HostHealth::Ignored,
            FailureKind::Cancelled | FailureKind::Aborted => HostHealth::Cancelled,
            FailureKind::SessionSetupFailed => HostHealth::SessionFailed,
            FailureKind::Unreachable | FailureKind::ManagementUnavailable => {
                HostHealth::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A fleet-wide observation from directory-service topology analysis.
///
/// Opaque to the engine; it is carried into the report unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyFinding {
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    /// Passed both probes: checked hosts plus session setup failures.
    pub reachable: usize,
    /// Failed the network probe or the management handshake.
    pub unreachable: usize,
    pub management_unavailable: usize,
    pub session_failed: usize,
    pub ignored: usize,
    /// Cancelled or aborted pipelines.
    pub cancelled: usize,
    pub fully_checked: usize,
    pub partially_failed: usize,
    pub checks: CheckTally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetReport {
    pub hosts: Vec<HostReport>,
    pub failures: Vec<FailureRecord>,
    pub findings: Vec<TopologyFinding>,
    pub summary: FleetSummary,
}

impl FleetReport {
    /// Failures that deserve a place in an "exceptions" section.
    pub fn exceptions(&self) -> impl Iterator<Item = &FailureRecord> {
        self.failures
            .iter()
            .filter(|record| record.kind != FailureKind::Ignored)
    }

    pub fn is_healthy(&self) -> bool {
        self.summary.checks.failed == 0 && self.exceptions().next().is_none()
    }
}
