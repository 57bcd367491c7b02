use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::*;
use fleetcheck_common::config::Config;
use fleetcheck_common::host::{IgnoreList, dedup_hosts};
use fleetcheck_common::report::{FailureKind, FleetReport, FleetSummary, HostReport};
use fleetcheck_common::{success, warn};
use fleetcheck_core::{
    CheckRegistry, CheckRunner, CommandTransport, FleetDispatcher, HostExecutor, ReachabilityProber,
    StopSignal,
};

use crate::commands::{self, FleetArgs};
use crate::mprint;
use crate::terminal::{colors, format, print, spinner};

type Detail = (String, ColoredString);

pub async fn run(
    fleet: FleetArgs,
    findings: Option<PathBuf>,
    json: Option<PathBuf>,
    mut cfg: Config,
    quiet: u8,
) -> anyhow::Result<()> {
    fleet.apply(&mut cfg);
    let hosts = dedup_hosts(fleet.load_hosts()?);
    if hosts.is_empty() {
        print::header("zero hosts given", quiet);
        print::no_hosts();
        return Ok(());
    }

    let findings = match findings {
        Some(path) => commands::read_findings(&path)?,
        None => Vec::new(),
    };
    let registry = Arc::new(CheckRegistry::with_definitions(cfg.checks.clone())?);

    let stop = StopSignal::new();
    stop_on_interrupt(stop.clone());

    let executor = HostExecutor::from_config(
        &cfg,
        registry,
        Arc::new(CommandTransport::new(cfg.transport.clone())),
    )
    .with_stop_signal(stop.clone());

    let dispatcher = build_dispatcher(&cfg, hosts.len(), Arc::new(executor), stop);
    let ignore = IgnoreList::new(&cfg.ignore);

    let start_time = Instant::now();
    spinner::start();
    let outcome = dispatcher.run(hosts, &ignore, findings).await;
    spinner::stop();
    let report = outcome?;

    render_report(&report, start_time.elapsed(), quiet);

    if let Some(path) = json {
        write_json(&path, &report)?;
        success!("Report written to {}", path.display());
    }
    Ok(())
}

/// Dispatcher over the TCP probes, with the progress spinner attached.
pub(super) fn build_dispatcher(
    cfg: &Config,
    fleet_size: usize,
    runner: Arc<dyn CheckRunner>,
    stop: StopSignal,
) -> FleetDispatcher {
    let prober = ReachabilityProber::tcp(cfg.network_port, cfg.management_port, cfg.probe_timeout());
    let dispatcher = FleetDispatcher::new(Arc::new(prober), runner)
        .with_stop_signal(stop)
        .on_host_done(Box::new(move |done| spinner::report_progress(done, fleet_size)));

    match cfg.concurrency {
        Some(cap) => dispatcher.with_concurrency(cap),
        None => dispatcher,
    }
}

/// First Ctrl-C stops new work; a second one exits immediately.
pub(super) fn stop_on_interrupt(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted. Waiting for in-flight checks, press Ctrl-C again to quit");
        stop.stop();

        if tokio::signal::ctrl_c().await.is_ok() {
            spinner::stop();
            std::process::exit(130);
        }
    });
}

fn write_json(path: &Path, report: &FleetReport) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(report)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn render_report(report: &FleetReport, total_time: Duration, quiet: u8) {
    if quiet < 2 {
        print::header("fleet report", quiet);
        print_host_reports(&report.hosts);
    }

    if report.exceptions().next().is_some() {
        print::header("exceptions", quiet);
        for (idx, record) in report.exceptions().enumerate() {
            print::tree_head(idx, &record.host.name, format::health_badge(record.health()));
            print::as_tree_one_level(format::failure_to_details(record));
        }
    }

    print_ignored(report, quiet);

    if !report.findings.is_empty() {
        print::header("topology findings", quiet);
        for finding in &report.findings {
            mprint!(&format!(
                " {} {} {}",
                format::severity_label(finding.severity),
                finding.source.color(colors::ACCENT),
                finding.message.color(colors::TEXT_DEFAULT)
            ));
        }
    }

    print_summary(&report.summary, total_time, quiet);
}

fn print_host_reports(reports: &[HostReport]) {
    for (idx, report) in reports.iter().enumerate() {
        print::tree_head(idx, &report.host.name, format::health_badge(report.health()));
        let mut details: Vec<Detail> = vec![format::reachability_to_detail(&report.reachability)];
        details.extend(report.checks.iter().map(format::check_to_detail));
        print::as_tree_one_level(details);
        if idx + 1 != reports.len() {
            mprint!();
        }
    }
}

fn print_ignored(report: &FleetReport, quiet: u8) {
    if quiet > 0 {
        return;
    }
    let ignored: Vec<&str> = report
        .failures
        .iter()
        .filter(|record| record.kind == FailureKind::Ignored)
        .map(|record| record.host.name.as_str())
        .collect();
    if ignored.is_empty() {
        return;
    }
    mprint!();
    mprint!(&format!("{} {}", "Ignored:".color(colors::SKIPPED), ignored.join(", ").dimmed()));
}

fn print_summary(summary: &FleetSummary, total_time: Duration, quiet: u8) {
    let checked: ColoredString = format!("{}/{} hosts reachable", summary.reachable, summary.total)
        .bold()
        .green();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: ColoredString =
        format!("Run complete: {checked} in {total_time}").color(colors::TEXT_DEFAULT);

    if quiet > 0 {
        mprint!();
        success!("{}", output);
        return;
    }

    print::fat_separator();
    print::centerln(&output.to_string());
    print::as_tree_one_level(summary_details(summary));
    print::end_of_program();
}

fn summary_details(summary: &FleetSummary) -> Vec<Detail> {
    let count = |n: usize, color: colored::Color| -> ColoredString {
        if n == 0 {
            n.to_string().color(colors::TEXT_DEFAULT)
        } else {
            n.to_string().color(color)
        }
    };
    vec![
        ("Fully checked".into(), count(summary.fully_checked, colors::OK)),
        ("Partially failed".into(), count(summary.partially_failed, colors::WARNING)),
        ("Unreachable".into(), count(summary.unreachable, colors::FAILED)),
        ("No management".into(), count(summary.management_unavailable, colors::FAILED)),
        ("Session failed".into(), count(summary.session_failed, colors::FAILED)),
        ("Ignored".into(), count(summary.ignored, colors::SKIPPED)),
        ("Cancelled".into(), count(summary.cancelled, colors::SKIPPED)),
        (
            "Checks".into(),
            format!(
                "{} ok / {} skipped / {} failed",
                summary.checks.succeeded, summary.checks.skipped, summary.checks.failed
            )
            .normal(),
        ),
    ]
}
