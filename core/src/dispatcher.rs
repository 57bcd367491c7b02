//! # Fleet Dispatcher
//!
//! Drives one host pipeline (probe, session, checks) per host across the
//! fleet with a capped number of pipelines in flight.
//!
//! * Ignored hosts are recorded up front and never probed.
//! * Each pipeline returns its own [`HostOutcome`]; outcomes are merged after
//!   the join, so no collection is shared between workers.
//! * Output is sorted by host name before aggregation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fleetcheck_common::host::{Host, IgnoreList, dedup_hosts};
use fleetcheck_common::report::{FailureRecord, FleetReport, HostReport, TopologyFinding};
use fleetcheck_common::{AggregationError, debug, error, info};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, info_span};

use crate::aggregate;
use crate::executor::{CheckRunner, HostOutcome};
use crate::probe::Prober;
use crate::signal::{AbortOnDrop, StopSignal};

pub type ProgressCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Host reports and failure records of a finished dispatch, sorted by host name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub reports: Vec<HostReport>,
    pub failures: Vec<FailureRecord>,
}

pub struct FleetDispatcher {
    prober: Arc<dyn Prober>,
    runner: Arc<dyn CheckRunner>,
    concurrency: Option<usize>,
    stop: StopSignal,
    on_host_done: Option<Arc<ProgressCallback>>,
}

impl FleetDispatcher {
    pub fn new(prober: Arc<dyn Prober>, runner: Arc<dyn CheckRunner>) -> Self {
        Self {
            prober,
            runner,
            concurrency: None,
            stop: StopSignal::new(),
            on_host_done: None,
        }
    }

    /// Fixes the concurrency cap. Without it the cap is derived from the fleet size.
    pub fn with_concurrency(mut self, cap: usize) -> Self {
        self.concurrency = Some(cap.max(1));
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Called with the running count of finished hosts, ignored ones included.
    pub fn on_host_done(mut self, callback: ProgressCallback) -> Self {
        self.on_host_done = Some(Arc::new(callback));
        self
    }

    /// Dispatches the fleet and aggregates the result with `findings`.
    pub async fn run(
        &self,
        hosts: Vec<Host>,
        ignore: &IgnoreList,
        findings: Vec<TopologyFinding>,
    ) -> Result<FleetReport, AggregationError> {
        let hosts = dedup_hosts(hosts);
        let outcome = self.fan_out(hosts.clone(), ignore).await;
        aggregate::aggregate(&hosts, outcome.reports, outcome.failures, findings)
    }

    /// Dispatches the fleet without aggregating.
    pub async fn dispatch(&self, hosts: Vec<Host>, ignore: &IgnoreList) -> DispatchOutcome {
        self.fan_out(dedup_hosts(hosts), ignore).await
    }

    async fn fan_out(&self, hosts: Vec<Host>, ignore: &IgnoreList) -> DispatchOutcome {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut outcome = DispatchOutcome::default();

        let (ignored, active): (Vec<Host>, Vec<Host>) =
            hosts.into_iter().partition(|host| ignore.matches(host));

        for host in ignored {
            debug!(host = %host.name, "ignored");
            outcome.failures.push(FailureRecord::ignored(host));
            self.report_progress(&finished);
        }

        let cap = self
            .concurrency
            .unwrap_or_else(|| fleetcheck_common::config::derive_concurrency(active.len()));
        info!("Checking {} hosts, {} at a time", active.len(), cap);

        let permits = Arc::new(Semaphore::new(cap));
        let mut pipelines: JoinSet<HostOutcome> = JoinSet::new();

        for host in active {
            let host = Arc::new(host);
            let permits = permits.clone();
            let prober = self.prober.clone();
            let runner = self.runner.clone();
            let stop = self.stop.clone();
            let span = info_span!("host", name = %host.name);

            pipelines.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(FailureRecord::cancelled(host.as_ref().clone()));
                    };
                    guarded_pipeline(host, prober, runner, stop).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok(Ok(report)) => outcome.reports.push(report),
                Ok(Err(record)) => outcome.failures.push(record),
                Err(e) => error!("host pipeline task failed outside its guard: {e}"),
            }
            self.report_progress(&finished);
        }

        outcome.reports.sort_by_key(|report| report.host.key());
        outcome.failures.sort_by_key(|record| record.host.key());
        outcome
    }

    fn report_progress(&self, finished: &AtomicUsize) {
        let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = &self.on_host_done {
            callback(done);
        }
    }
}

/// Runs the pipeline in its own task so a panic is mapped back to its host.
///
/// The inner task is aborted if this future is dropped, so it never runs on
/// without the concurrency permit held by its caller.
async fn guarded_pipeline(
    host: Arc<Host>,
    prober: Arc<dyn Prober>,
    runner: Arc<dyn CheckRunner>,
    stop: StopSignal,
) -> HostOutcome {
    let pipeline = tokio::spawn(host_pipeline(host.clone(), prober, runner, stop).in_current_span());
    let _guard = AbortOnDrop::new(pipeline.abort_handle());
    match pipeline.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(host = %host.name, "host pipeline aborted: {e}");
            Err(FailureRecord::aborted(host.as_ref().clone(), e))
        }
    }
}

/// probe -> session -> ordered checks, for one host.
async fn host_pipeline(
    host: Arc<Host>,
    prober: Arc<dyn Prober>,
    runner: Arc<dyn CheckRunner>,
    stop: StopSignal,
) -> HostOutcome {
    if stop.is_stopped() {
        return Err(FailureRecord::cancelled(host.as_ref().clone()));
    }

    let reachability = prober.probe(&host).await;
    if let Some(record) = FailureRecord::unreachable(host.as_ref().clone(), reachability) {
        info!(host = %host.name, "host is {}", record.kind);
        return Err(record);
    }

    if stop.is_stopped() {
        return Err(FailureRecord::cancelled(host.as_ref().clone()));
    }

    runner.run_checks(host, reachability).await
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
