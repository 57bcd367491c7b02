use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use fleetcheck_common::error::CheckError;
use fleetcheck_common::host::{Host, IgnoreList};
use fleetcheck_common::report::{CheckResult, FailureKind, HostHealth};
use fleetcheck_core::{CheckRegistry, CheckSpec, FleetDispatcher, RemoteSession, StopSignal};
use serde_json::Value;

use crate::util::{executor, hosts, registry, Behaviour, FakeCheck, FakeProber, FakeSessions};

/// Pulls the stop signal the first time it runs.
struct InterruptingCheck {
    stop: StopSignal,
}

#[async_trait]
impl CheckSpec for InterruptingCheck {
    fn name(&self) -> &str {
        "interrupt"
    }

    fn applies_to(&self, _host: &Host) -> bool {
        true
    }

    async fn execute(&self, _host: &Host, _session: &dyn RemoteSession) -> anyhow::Result<Value> {
        self.stop.stop();
        Ok(Value::Bool(true))
    }
}

#[tokio::test]
async fn stop_before_start_cancels_every_host() {
    let stop = StopSignal::new();
    stop.stop();
    let prober = Arc::new(FakeProber::default());
    let runner = executor(registry(vec![]), Arc::new(FakeSessions::default()))
        .with_stop_signal(stop.clone());

    let report = FleetDispatcher::new(prober.clone(), Arc::new(runner))
        .with_stop_signal(stop)
        .run(hosts(&["dc01", "dc02", "lab01"]), &IgnoreList::new(["lab01"]), vec![])
        .await
        .unwrap();

    assert!(report.hosts.is_empty());
    assert!(prober.probed().is_empty());
    assert_eq!(report.summary.cancelled, 2);
    assert_eq!(report.summary.ignored, 1);
    assert!(report
        .failures
        .iter()
        .filter(|f| f.kind != FailureKind::Ignored)
        .all(|f| f.health() == HostHealth::Cancelled));
}

#[tokio::test]
async fn stop_mid_run_finishes_the_running_host_and_cancels_the_rest() {
    let stop = StopSignal::new();
    let after = FakeCheck::new("time-sync", Behaviour::Succeed);
    let after_executed = after.executed.clone();

    let mut checks = CheckRegistry::new();
    checks.register(FakeCheck::new("uptime", Behaviour::Succeed)).unwrap();
    checks.register(InterruptingCheck { stop: stop.clone() }).unwrap();
    checks.register(after).unwrap();

    let sessions = Arc::new(FakeSessions::default());
    let runner = executor(Arc::new(checks), sessions.clone()).with_stop_signal(stop.clone());

    let report = FleetDispatcher::new(Arc::new(FakeProber::default()), Arc::new(runner))
        .with_concurrency(1)
        .with_stop_signal(stop)
        .run(hosts(&["dc01", "dc02", "dc03"]), &IgnoreList::default(), vec![])
        .await
        .unwrap();

    assert_eq!(report.hosts.len(), 1);
    let host = &report.hosts[0];
    assert!(host.get("uptime").unwrap().is_success());
    assert!(host.get("interrupt").unwrap().is_success());
    assert_eq!(
        host.get("time-sync"),
        Some(&CheckResult::failed(CheckError::Cancelled))
    );
    assert!(after_executed.lock().unwrap().is_empty());
    assert_eq!(sessions.closed.load(Ordering::SeqCst), 1);

    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.kind == FailureKind::Cancelled));
    assert_eq!(report.summary.total, 3);
}
