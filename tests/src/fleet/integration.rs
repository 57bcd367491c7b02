use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fleetcheck_common::error::CheckError;
use fleetcheck_common::host::{Host, HostAttributes, IgnoreList};
use fleetcheck_common::report::{CheckResult, FailureKind, HostHealth, Severity, TopologyFinding};
use fleetcheck_core::{aggregate, FleetDispatcher, HostExecutor};
use tokio::sync::Semaphore;

use crate::util::{executor, hosts, registry, Behaviour, FakeCheck, FakeProber, FakeSessions};

/// HostA healthy, HostB down, HostC with one inapplicable and one timed-out check.
#[tokio::test]
async fn mixed_fleet_produces_expected_report() {
    let first = FakeCheck::new("first", Behaviour::Succeed).not_on("HostC");
    let second = FakeCheck::new("second", Behaviour::Succeed).hangs_on("HostC");
    let sessions = Arc::new(FakeSessions::default());
    let runner = executor(registry(vec![first, second]), sessions.clone());
    let prober = FakeProber::default().with_status("HostB", false, false);

    let report = FleetDispatcher::new(Arc::new(prober), Arc::new(runner))
        .run(hosts(&["HostA", "HostB", "HostC"]), &IgnoreList::default(), vec![])
        .await
        .unwrap();

    let names: Vec<&str> = report.hosts.iter().map(|r| r.host.name.as_str()).collect();
    assert_eq!(names, vec!["HostA", "HostC"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].host.name, "HostB");
    assert_eq!(report.failures[0].kind, FailureKind::Unreachable);

    let host_a = &report.hosts[0];
    assert!(host_a.checks.iter().all(|c| c.result.is_success()));
    assert_eq!(host_a.health(), HostHealth::FullyChecked);

    let host_c = &report.hosts[1];
    assert!(host_c.get("first").unwrap().is_skipped());
    assert!(matches!(
        host_c.get("second"),
        Some(CheckResult::Failed { error: CheckError::Timeout { .. } })
    ));
    assert_eq!(host_c.health(), HostHealth::PartiallyFailed);

    let s = report.summary;
    assert_eq!((s.reachable, s.unreachable), (2, 1));
    assert_eq!((s.checks.succeeded, s.checks.skipped, s.checks.failed), (2, 1, 1));
    assert_eq!(sessions.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ignored_host_is_never_probed_or_checked() {
    let check = FakeCheck::new("uptime", Behaviour::Succeed);
    let executed = check.executed.clone();
    let sessions = Arc::new(FakeSessions::default());
    let prober = Arc::new(FakeProber::default());
    let runner = executor(registry(vec![check]), sessions.clone());

    let report = FleetDispatcher::new(prober.clone(), Arc::new(runner))
        .run(hosts(&["HostA", "HostD"]), &IgnoreList::new(["hostd"]), vec![])
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].host.name, "HostD");
    assert_eq!(report.failures[0].kind, FailureKind::Ignored);
    assert!(report.failures[0].reachability.is_none());

    assert_eq!(prober.probed(), vec!["hosta".to_string()]);
    assert_eq!(sessions.opened(), vec!["hosta".to_string()]);
    assert_eq!(*executed.lock().unwrap(), vec!["hosta".to_string()]);
    assert_eq!(report.summary.ignored, 1);
    assert!(report.is_healthy());
}

#[tokio::test]
async fn excluded_attribute_behaves_like_ignore_entry() {
    let prober = Arc::new(FakeProber::default());
    let runner = executor(registry(vec![]), Arc::new(FakeSessions::default()));
    let retired = Host::new("dc09").with_attributes(HostAttributes {
        excluded: true,
        ..Default::default()
    });

    let report = FleetDispatcher::new(prober.clone(), Arc::new(runner))
        .run(vec![Host::new("dc01"), retired], &IgnoreList::default(), vec![])
        .await
        .unwrap();

    assert_eq!(report.failures[0].kind, FailureKind::Ignored);
    assert_eq!(prober.probed(), vec!["dc01".to_string()]);
}

/// Twelve hosts behind a cap of three: exactly three pipelines wait at the
/// gate until the test opens it, and no fourth one ever joins them.
#[tokio::test]
async fn concurrency_cap_is_filled_but_never_exceeded() {
    let gate = Arc::new(Semaphore::new(0));
    let check = FakeCheck::new("gated", Behaviour::Succeed).gated_by(gate.clone());
    let gauge = check.gauge.clone();
    let runner = HostExecutor::new(registry(vec![check]), Arc::new(FakeSessions::default()))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
    let dispatcher = FleetDispatcher::new(Arc::new(FakeProber::default()), Arc::new(runner))
        .with_concurrency(3);

    let fleet: Vec<Host> = (0..12).map(|i| Host::new(format!("dc{i:02}"))).collect();
    let ignore = IgnoreList::default();
    let run = tokio::spawn(async move { dispatcher.run(fleet, &ignore, vec![]).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while gauge.current() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("three pipelines should reach the gate");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gauge.current(), 3);

    gate.add_permits(12);
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.hosts.len(), 12);
    assert!(report.hosts.iter().all(|r| r.get("gated").unwrap().is_success()));
    assert_eq!(gauge.peak(), 3);
}

#[tokio::test]
async fn failing_check_does_not_stop_later_checks() {
    let checks = vec![
        FakeCheck::new("disk-space", Behaviour::Fail),
        FakeCheck::new("hangs", Behaviour::Hang),
        FakeCheck::new("time-sync", Behaviour::Succeed),
        FakeCheck::new("update-history", Behaviour::Succeed).not_on("core01"),
    ];
    let runner = executor(registry(checks), Arc::new(FakeSessions::default()));

    let report = FleetDispatcher::new(Arc::new(FakeProber::default()), Arc::new(runner))
        .run(hosts(&["core01"]), &IgnoreList::default(), vec![])
        .await
        .unwrap();

    let host = &report.hosts[0];
    let order: Vec<&str> = host.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(order, vec!["disk-space", "hangs", "time-sync", "update-history"]);
    assert!(host.get("disk-space").unwrap().is_failed());
    assert!(host.get("hangs").unwrap().error().is_some_and(CheckError::is_timeout));
    assert!(host.get("time-sync").unwrap().is_success());
    assert!(host.get("update-history").unwrap().is_skipped());
}

#[tokio::test]
async fn every_host_is_reported_exactly_once() {
    let sessions = Arc::new(FakeSessions::default().refusing("dc03"));
    let runner = executor(registry(vec![FakeCheck::new("uptime", Behaviour::Succeed)]), sessions);
    let prober = FakeProber::default()
        .with_status("dc02", false, false)
        .with_status("dc04", true, false);

    let input = hosts(&["dc01", "dc02", "dc03", "dc04", "dc05", "DC01"]);
    let report = FleetDispatcher::new(Arc::new(prober), Arc::new(runner))
        .run(input, &IgnoreList::new(["dc05"]), vec![])
        .await
        .unwrap();

    let mut seen: Vec<String> = report
        .hosts
        .iter()
        .map(|r| r.host.key())
        .chain(report.failures.iter().map(|f| f.host.key()))
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["dc01", "dc02", "dc03", "dc04", "dc05"]);

    let kind_of = |name: &str| {
        report
            .failures
            .iter()
            .find(|f| f.host.name == name)
            .map(|f| f.kind)
    };
    assert_eq!(kind_of("dc02"), Some(FailureKind::Unreachable));
    assert_eq!(kind_of("dc03"), Some(FailureKind::SessionSetupFailed));
    assert_eq!(kind_of("dc04"), Some(FailureKind::ManagementUnavailable));
    assert_eq!(kind_of("dc05"), Some(FailureKind::Ignored));

    let s = report.summary;
    assert_eq!(s.total, 5);
    assert_eq!((s.reachable, s.unreachable), (2, 2));
    assert_eq!((s.management_unavailable, s.session_failed, s.ignored), (1, 1, 1));
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn aggregation_is_idempotent() {
    let runner = executor(
        registry(vec![
            FakeCheck::new("uptime", Behaviour::Succeed),
            FakeCheck::new("hotfixes", Behaviour::Fail),
        ]),
        Arc::new(FakeSessions::default()),
    );
    let prober = FakeProber::default().with_status("dc02", false, true);
    let fleet = hosts(&["dc01", "dc02", "dc03"]);

    let outcome = FleetDispatcher::new(Arc::new(prober), Arc::new(runner))
        .dispatch(fleet.clone(), &IgnoreList::default())
        .await;
    let findings = vec![TopologyFinding {
        source: "sites".into(),
        severity: Severity::Critical,
        message: "site Branch has no global catalog".into(),
    }];

    let first = aggregate(&fleet, outcome.reports.clone(), outcome.failures.clone(), findings.clone());
    let second = aggregate(&fleet, outcome.reports, outcome.failures, findings);
    assert_eq!(first.unwrap(), second.unwrap());
}
