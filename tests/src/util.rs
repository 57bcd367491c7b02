//! Fakes for driving whole fleets without a network or remote hosts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetcheck_common::host::Host;
use fleetcheck_common::report::ReachabilityStatus;
use fleetcheck_core::{CheckRegistry, CheckSpec, HostExecutor, Prober, RemoteSession, SessionFactory};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Every host is up unless listed otherwise. Records who was probed.
#[derive(Default)]
pub struct FakeProber {
    statuses: HashMap<String, ReachabilityStatus>,
    pub probed: Arc<Mutex<Vec<String>>>,
}

impl FakeProber {
    pub fn with_status(mut self, name: &str, network: bool, management: bool) -> Self {
        self.statuses
            .insert(name.to_ascii_lowercase(), ReachabilityStatus::new(network, management));
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, host: &Host) -> ReachabilityStatus {
        self.probed.lock().unwrap().push(host.key());
        self.statuses
            .get(&host.key())
            .copied()
            .unwrap_or(ReachabilityStatus::new(true, true))
    }
}

/// Counts opens and closes; refuses hosts listed in `refuse`.
#[derive(Default)]
pub struct FakeSessions {
    refuse: HashSet<String>,
    pub opened: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeSessions {
    pub fn refusing(mut self, name: &str) -> Self {
        self.refuse.insert(name.to_ascii_lowercase());
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self, host: &Host) -> anyhow::Result<Arc<dyn RemoteSession>> {
        if self.refuse.contains(&host.key()) {
            anyhow::bail!("the WinRM client cannot process the request");
        }
        self.opened.lock().unwrap().push(host.key());
        Ok(Arc::new(FakeSession {
            host: host.name.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeSession {
    host: String,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn invoke(&self, script: &str) -> anyhow::Result<Value> {
        Ok(json!({ "host": self.host, "script": script }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

pub struct FakeCheck {
    name: &'static str,
    behaviour: Behaviour,
    /// Hosts the check does not apply to.
    skip: HashSet<String>,
    /// Hosts on which the check hangs regardless of `behaviour`.
    hang_on: HashSet<String>,
    /// Executions wait here for a permit the test hands out, tracked by `gauge`.
    gate: Option<Arc<Semaphore>>,
    pub executed: Arc<Mutex<Vec<String>>>,
    pub gauge: Arc<Gauge>,
}

impl FakeCheck {
    pub fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            name,
            behaviour,
            skip: HashSet::new(),
            hang_on: HashSet::new(),
            gate: None,
            executed: Arc::new(Mutex::new(Vec::new())),
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn not_on(mut self, name: &str) -> Self {
        self.skip.insert(name.to_ascii_lowercase());
        self
    }

    pub fn hangs_on(mut self, name: &str) -> Self {
        self.hang_on.insert(name.to_ascii_lowercase());
        self
    }

    pub fn gated_by(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl CheckSpec for FakeCheck {
    fn name(&self) -> &str {
        self.name
    }

    fn applies_to(&self, host: &Host) -> bool {
        !self.skip.contains(&host.key())
    }

    async fn execute(&self, host: &Host, session: &dyn RemoteSession) -> anyhow::Result<Value> {
        self.executed.lock().unwrap().push(host.key());
        if self.hang_on.contains(&host.key()) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if let Some(gate) = &self.gate {
            self.gauge.enter();
            gate.acquire().await?.forget();
            self.gauge.leave();
        }
        match self.behaviour {
            Behaviour::Succeed => session.invoke(self.name).await,
            Behaviour::Fail => anyhow::bail!("Get-CimInstance: access denied"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Value::Null)
            }
        }
    }
}

/// Current and peak number of overlapping executions.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|name| Host::new(*name)).collect()
}

pub fn registry(checks: Vec<FakeCheck>) -> Arc<CheckRegistry> {
    let mut registry = CheckRegistry::new();
    for check in checks {
        registry.register(check).unwrap();
    }
    Arc::new(registry)
}

/// Executor with short timeouts: 200ms per session step, 100ms per check.
pub fn executor(registry: Arc<CheckRegistry>, sessions: Arc<FakeSessions>) -> HostExecutor {
    HostExecutor::new(registry, sessions)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(100))
}
