use colored::*;
use fleetcheck_common::report::{
    CheckOutcome, CheckResult, FailureRecord, HostHealth, ReachabilityStatus, Severity,
};
use serde_json::Value;

use crate::terminal::colors;

type Detail = (String, ColoredString);

const PAYLOAD_PREVIEW: usize = 48;

pub fn health_badge(health: HostHealth) -> ColoredString {
    let label = format!("({health})");
    match health {
        HostHealth::FullyChecked => label.color(colors::OK),
        HostHealth::PartiallyFailed => label.color(colors::WARNING),
        HostHealth::Unreachable | HostHealth::SessionFailed => label.color(colors::FAILED),
        HostHealth::Ignored | HostHealth::Cancelled => label.color(colors::SKIPPED),
    }
}

pub fn reachability_to_detail(status: &ReachabilityStatus) -> Detail {
    let flag = |up: bool| if up { "up".color(colors::OK) } else { "down".color(colors::FAILED) };
    let value = format!("network {} / management {}", flag(status.network), flag(status.management));
    ("Reach".to_string(), value.normal())
}

pub fn check_to_detail(outcome: &CheckOutcome) -> Detail {
    let value: ColoredString = match &outcome.result {
        CheckResult::Success { payload } => {
            format!("ok {}", preview(payload).color(colors::SEPARATOR)).color(colors::OK)
        }
        CheckResult::Skipped { reason } => format!("skipped ({reason})").color(colors::SKIPPED),
        CheckResult::Failed { error } => format!("failed: {error}").color(colors::FAILED),
    };
    (outcome.name.clone(), value)
}

pub fn failure_to_details(record: &FailureRecord) -> Vec<Detail> {
    let mut details: Vec<Detail> = Vec::new();
    if let Some(addr) = &record.host.address {
        details.push(("Address".to_string(), addr.color(colors::TEXT_DEFAULT)));
    }
    if let Some(status) = &record.reachability {
        details.push(reachability_to_detail(status));
    }
    details.push(("Outcome".to_string(), record.kind.to_string().color(colors::FAILED)));
    if let Some(error) = &record.error {
        details.push(("Error".to_string(), error.color(colors::TEXT_DEFAULT)));
    }
    details
}

pub fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Info => "info".color(colors::PRIMARY),
        Severity::Warning => "warning".color(colors::WARNING),
        Severity::Critical => "critical".color(colors::FAILED).bold(),
    }
}

/// Single-line, truncated rendering of a check payload.
fn preview(payload: &Value) -> String {
    let compact: String = match payload {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if compact.chars().count() <= PAYLOAD_PREVIEW {
        return compact;
    }
    let cut: String = compact.chars().take(PAYLOAD_PREVIEW).collect();
    format!("{cut}…")
}
