//! # Per-Host Check Executor
//!
//! Runs the registry's battery against one reachable host:
//! 1. **Session**: opens the shared remote session, bounded by the session timeout.
//!    A failure here is the only thing that aborts the whole host.
//! 2. **Checks**: walks the registry in order. Inapplicable checks are skipped
//!    before anything executes; every other check runs in its own task under
//!    the check timeout, so an error, a panic or a hang stays inside that check.
//! 3. **Release**: closes the session, whatever happened above.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleetcheck_common::config::Config;
use fleetcheck_common::error::CheckError;
use fleetcheck_common::host::Host;
use fleetcheck_common::report::{CheckResult, FailureRecord, HostReport, ReachabilityStatus};
use fleetcheck_common::{debug, warn};
use tokio::time::timeout;
use tracing::{Instrument, debug_span};

use crate::registry::{CheckRegistry, CheckSpec};
use crate::session::{RemoteSession, SessionFactory};
use crate::signal::{AbortOnDrop, StopSignal};

/// The normalized outcome of one host pipeline.
pub type HostOutcome = Result<HostReport, FailureRecord>;

/// Runs all checks for a host that already passed reachability probing.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run_checks(&self, host: Arc<Host>, reachability: ReachabilityStatus) -> HostOutcome;
}

pub struct HostExecutor {
    registry: Arc<CheckRegistry>,
    sessions: Arc<dyn SessionFactory>,
    session_timeout: Duration,
    check_timeout: Duration,
    stop: StopSignal,
}

impl HostExecutor {
    pub fn new(registry: Arc<CheckRegistry>, sessions: Arc<dyn SessionFactory>) -> Self {
        let defaults = Config::default();
        Self {
            registry,
            sessions,
            session_timeout: defaults.session_timeout(),
            check_timeout: defaults.check_timeout(),
            stop: StopSignal::new(),
        }
    }

    pub fn from_config(
        cfg: &Config,
        registry: Arc<CheckRegistry>,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        Self::new(registry, sessions).with_timeouts(cfg.session_timeout(), cfg.check_timeout())
    }

    pub fn with_timeouts(mut self, session_timeout: Duration, check_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self.check_timeout = check_timeout;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    async fn open_session(
        &self,
        host: &Host,
        reachability: ReachabilityStatus,
    ) -> Result<Arc<dyn RemoteSession>, FailureRecord> {
        match timeout(self.session_timeout, self.sessions.open(host)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => {
                warn!(host = %host.name, "session setup failed: {e:#}");
                Err(FailureRecord::session_failed(host.clone(), reachability, e))
            }
            Err(_elapsed) => {
                warn!(host = %host.name, "session setup timed out after {:?}", self.session_timeout);
                let reason = format!("session setup timed out after {:?}", self.session_timeout);
                Err(FailureRecord::session_failed(host.clone(), reachability, reason))
            }
        }
    }

    async fn run_one(
        &self,
        check: &Arc<dyn CheckSpec>,
        host: &Arc<Host>,
        session: &Arc<dyn RemoteSession>,
    ) -> CheckResult {
        if !check.applies_to(host) {
            return CheckResult::skipped(check.skip_reason(host));
        }
        if self.stop.is_stopped() {
            return CheckResult::failed(CheckError::Cancelled);
        }

        let span = debug_span!("check", name = check.name());
        let task = {
            let check = check.clone();
            let host = host.clone();
            let session = session.clone();
            tokio::spawn(async move { check.execute(&host, session.as_ref()).await }.instrument(span))
        };
        let _guard = AbortOnDrop::new(task.abort_handle());

        match timeout(self.check_timeout, task).await {
            Ok(Ok(Ok(payload))) => CheckResult::success(payload),
            Ok(Ok(Err(e))) => {
                debug!(host = %host.name, check = check.name(), "check failed: {e:#}");
                CheckResult::failed(CheckError::remote(e))
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                warn!(host = %host.name, check = check.name(), "check panicked");
                CheckResult::failed(CheckError::Panicked {
                    message: panic_message(join_err.into_panic()),
                })
            }
            Ok(Err(_cancelled)) => CheckResult::failed(CheckError::Cancelled),
            Err(_elapsed) => {
                debug!(host = %host.name, check = check.name(), "check timed out");
                CheckResult::failed(CheckError::timeout(self.check_timeout))
            }
        }
    }

    async fn release(&self, host: &Host, session: Arc<dyn RemoteSession>) {
        match timeout(self.session_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(host = %host.name, "failed to close session: {e:#}"),
            Err(_elapsed) => warn!(host = %host.name, "session close timed out"),
        }
    }
}

#[async_trait]
impl CheckRunner for HostExecutor {
    async fn run_checks(&self, host: Arc<Host>, reachability: ReachabilityStatus) -> HostOutcome {
        let session = self.open_session(&host, reachability).await?;

        let mut report = HostReport::new(host.as_ref().clone(), reachability);
        for check in self.registry.iter() {
            let started = Instant::now();
            let result = self.run_one(check, &host, &session).await;
            report.push(check.name(), result, started.elapsed().as_millis() as u64);
        }

        self.release(&host, session).await;
        Ok(report)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcheck_common::host::HostAttributes;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteSession for EchoSession {
        async fn invoke(&self, script: &str) -> anyhow::Result<Value> {
            Ok(json!(script))
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Sessions {
        fail: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionFactory for Sessions {
        async fn open(&self, _host: &Host) -> anyhow::Result<Arc<dyn RemoteSession>> {
            if self.fail {
                anyhow::bail!("access denied");
            }
            Ok(Arc::new(EchoSession {
                closed: self.closed.clone(),
            }))
        }
    }

    /// Never finishes opening.
    struct StalledSessions;

    #[async_trait]
    impl SessionFactory for StalledSessions {
        async fn open(&self, _host: &Host) -> anyhow::Result<Arc<dyn RemoteSession>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            anyhow::bail!("unreachable after the session timeout")
        }
    }

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct FakeCheck {
        name: &'static str,
        applies: bool,
        behaviour: Behaviour,
        executed: Arc<AtomicUsize>,
    }

    impl FakeCheck {
        fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                applies: true,
                behaviour,
                executed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn inapplicable(mut self) -> Self {
            self.applies = false;
            self
        }
    }

    #[async_trait]
    impl CheckSpec for FakeCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn applies_to(&self, _host: &Host) -> bool {
            self.applies
        }

        async fn execute(&self, _host: &Host, session: &dyn RemoteSession) -> anyhow::Result<Value> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => session.invoke(self.name).await,
                Behaviour::Fail => anyhow::bail!("WMI query failed"),
                Behaviour::Panic => panic!("unexpected payload"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    fn build_executor(checks: Vec<FakeCheck>, fail_session: bool) -> (HostExecutor, Arc<AtomicUsize>) {
        let mut registry = CheckRegistry::new();
        for check in checks {
            registry.register(check).unwrap();
        }
        let closed = Arc::new(AtomicUsize::new(0));
        let sessions = Sessions {
            fail: fail_session,
            closed: closed.clone(),
        };
        let executor = HostExecutor::new(Arc::new(registry), Arc::new(sessions))
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(100));
        (executor, closed)
    }

    fn reachable() -> ReachabilityStatus {
        ReachabilityStatus::new(true, true)
    }

    #[tokio::test]
    async fn failing_check_does_not_stop_the_sequence() {
        let (executor, closed) = build_executor(
            vec![
                FakeCheck::new("first", Behaviour::Fail),
                FakeCheck::new("second", Behaviour::Panic),
                FakeCheck::new("third", Behaviour::Succeed),
            ],
            false,
        );

        let report = executor
            .run_checks(Arc::new(Host::new("dc01")), reachable())
            .await
            .unwrap();

        assert!(matches!(report.get("first"), Some(CheckResult::Failed { error: CheckError::Remote { .. } })));
        assert!(matches!(report.get("second"), Some(CheckResult::Failed { error: CheckError::Panicked { .. } })));
        assert_eq!(report.get("third"), Some(&CheckResult::success(json!("third"))));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inapplicable_check_is_skipped_without_executing() {
        let check = FakeCheck::new("shell-only", Behaviour::Fail).inapplicable();
        let executed = check.executed.clone();
        let (executor, _) = build_executor(vec![check], false);

        let host = Host::new("core01").with_attributes(HostAttributes {
            server_core: true,
            ..Default::default()
        });
        let report = executor.run_checks(Arc::new(host), reachable()).await.unwrap();

        assert!(report.get("shell-only").unwrap().is_skipped());
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hanging_check_times_out_and_next_check_runs() {
        let (executor, _) = build_executor(
            vec![
                FakeCheck::new("slow", Behaviour::Hang),
                FakeCheck::new("fast", Behaviour::Succeed),
            ],
            false,
        );

        let started = Instant::now();
        let report = executor
            .run_checks(Arc::new(Host::new("dc01")), reachable())
            .await
            .unwrap();

        let error = report.get("slow").and_then(CheckResult::error).unwrap();
        assert!(error.is_timeout());
        assert!(report.get("fast").unwrap().is_success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn session_failure_yields_failure_record() {
        let check = FakeCheck::new("uptime", Behaviour::Succeed);
        let executed = check.executed.clone();
        let (executor, closed) = build_executor(vec![check], true);

        let record = executor
            .run_checks(Arc::new(Host::new("dc01")), reachable())
            .await
            .unwrap_err();

        assert_eq!(record.kind, fleetcheck_common::report::FailureKind::SessionSetupFailed);
        assert!(record.error.as_deref().unwrap().contains("access denied"));
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_setup_is_bounded_by_the_session_timeout() {
        let check = FakeCheck::new("uptime", Behaviour::Succeed);
        let executed = check.executed.clone();
        let mut registry = CheckRegistry::new();
        registry.register(check).unwrap();
        let executor = HostExecutor::new(Arc::new(registry), Arc::new(StalledSessions))
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));

        let started = Instant::now();
        let record = executor
            .run_checks(Arc::new(Host::new("dc01")), reachable())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(record.kind, fleetcheck_common::report::FailureKind::SessionSetupFailed);
        assert_eq!(
            record.error.as_deref(),
            Some("session setup timed out after 100ms")
        );
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stopped_run_cancels_remaining_checks_and_closes_session() {
        let stop = StopSignal::new();
        stop.stop();
        let (executor, closed) = build_executor(vec![FakeCheck::new("uptime", Behaviour::Succeed)], false);
        let executor = executor.with_stop_signal(stop);

        let report = executor
            .run_checks(Arc::new(Host::new("dc01")), reachable())
            .await
            .unwrap();

        assert_eq!(
            report.get("uptime"),
            Some(&CheckResult::failed(CheckError::Cancelled))
        );
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
