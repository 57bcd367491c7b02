//! # Result Aggregator
//!
//! Pure merge of host reports, failure records and topology findings into a
//! [`FleetReport`]. No I/O, no clock, no hidden state: the same inputs always
//! give the same report.
//!
//! Before merging, the coverage invariant is validated: every input host
//! appears exactly once across reports and failures. A violation is returned
//! as an [`AggregationError`] and is meant to abort the run.

use std::collections::HashSet;

use fleetcheck_common::AggregationError;
use fleetcheck_common::host::Host;
use fleetcheck_common::report::{
    FailureKind, FailureRecord, FleetReport, FleetSummary, HostHealth, HostReport, TopologyFinding,
};

pub fn aggregate(
    hosts: &[Host],
    mut reports: Vec<HostReport>,
    mut failures: Vec<FailureRecord>,
    findings: Vec<TopologyFinding>,
) -> Result<FleetReport, AggregationError> {
    validate_coverage(hosts, &reports, &failures)?;

    for report in &mut reports {
        report.recount();
    }
    reports.sort_by_key(|report| report.host.key());
    failures.sort_by_key(|record| record.host.key());

    let summary = summarize(&reports, &failures);
    Ok(FleetReport {
        hosts: reports,
        failures,
        findings,
        summary,
    })
}

fn validate_coverage(
    hosts: &[Host],
    reports: &[HostReport],
    failures: &[FailureRecord],
) -> Result<(), AggregationError> {
    let expected: HashSet<String> = hosts.iter().map(Host::key).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(expected.len());

    let reported = reports
        .iter()
        .map(|report| &report.host)
        .chain(failures.iter().map(|record| &record.host));

    for host in reported {
        let key = host.key();
        if !expected.contains(&key) {
            return Err(AggregationError::UnexpectedHost(host.name.clone()));
        }
        if !seen.insert(key) {
            return Err(AggregationError::DuplicateHost(host.name.clone()));
        }
    }

    if let Some(missing) = hosts.iter().find(|host| !seen.contains(&host.key())) {
        return Err(AggregationError::MissingHost(missing.name.clone()));
    }

    Ok(())
}

fn summarize(reports: &[HostReport], failures: &[FailureRecord]) -> FleetSummary {
    let mut summary = FleetSummary {
        total: reports.len() + failures.len(),
        reachable: reports.len(),
        ..Default::default()
    };

    for report in reports {
        summary.checks.merge(report.tally());
        match report.health() {
            HostHealth::PartiallyFailed => summary.partially_failed += 1,
            _ => summary.fully_checked += 1,
        }
    }

    for record in failures {
        match record.kind {
            FailureKind::Ignored => summary.ignored += 1,
            FailureKind::Unreachable => summary.unreachable += 1,
            FailureKind::ManagementUnavailable => {
                summary.unreachable += 1;
                summary.management_unavailable += 1;
            }
            FailureKind::SessionSetupFailed => {
                summary.reachable += 1;
                summary.session_failed += 1;
            }
            FailureKind::Cancelled | FailureKind::Aborted => summary.cancelled += 1,
        }
    }

    summary
}
