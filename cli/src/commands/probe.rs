use std::sync::Arc;

use async_trait::async_trait;
use colored::*;
use fleetcheck_common::config::Config;
use fleetcheck_common::host::{Host, IgnoreList, dedup_hosts};
use fleetcheck_common::report::{FleetReport, HostReport, ReachabilityStatus};
use fleetcheck_core::{CheckRunner, HostOutcome, StopSignal};

use crate::commands::FleetArgs;
use crate::commands::run::{build_dispatcher, stop_on_interrupt};
use crate::mprint;
use crate::terminal::{colors, format, print, spinner};

/// Stops every pipeline right after probing.
struct ReachabilityOnly;

#[async_trait]
impl CheckRunner for ReachabilityOnly {
    async fn run_checks(&self, host: Arc<Host>, reachability: ReachabilityStatus) -> HostOutcome {
        Ok(HostReport::new(host.as_ref().clone(), reachability))
    }
}

pub async fn probe(fleet: FleetArgs, mut cfg: Config, quiet: u8) -> anyhow::Result<()> {
    fleet.apply(&mut cfg);
    let hosts = dedup_hosts(fleet.load_hosts()?);
    if hosts.is_empty() {
        print::header("zero hosts given", quiet);
        print::no_hosts();
        return Ok(());
    }

    let stop = StopSignal::new();
    stop_on_interrupt(stop.clone());

    let dispatcher = build_dispatcher(&cfg, hosts.len(), Arc::new(ReachabilityOnly), stop);
    let ignore = IgnoreList::new(&cfg.ignore);

    spinner::start();
    let outcome = dispatcher.run(hosts, &ignore, Vec::new()).await;
    spinner::stop();
    let report = outcome?;

    print::header("reachability", quiet);
    print_lines(&report);
    if quiet == 0 {
        print::fat_separator();
        print::centerln(&format!(
            "{}/{} hosts reachable",
            report.summary.reachable.to_string().green().bold(),
            report.summary.total
        ));
    }
    Ok(())
}

/// One line per host, in name order.
fn print_lines(report: &FleetReport) {
    let width = report
        .hosts
        .iter()
        .map(|r| r.host.name.chars().count())
        .chain(report.failures.iter().map(|r| r.host.name.chars().count()))
        .max()
        .unwrap_or(0);

    let mut rows: Vec<(&str, String)> = report
        .hosts
        .iter()
        .map(|r| (r.host.name.as_str(), format::reachability_to_detail(&r.reachability).1.to_string()))
        .collect();
    rows.extend(report.failures.iter().map(|r| {
        let state = match &r.reachability {
            Some(status) => format::reachability_to_detail(status).1.to_string(),
            None => r.kind.to_string().color(colors::SKIPPED).to_string(),
        };
        (r.host.name.as_str(), state)
    }));
    rows.sort_by_key(|(name, _)| name.to_ascii_lowercase());

    for (name, state) in rows {
        let name = format!("{name:<width$}");
        mprint!(&format!(" {}  {}", name.color(colors::PRIMARY), state));
    }
}
