//! # Reachability Prober
//!
//! Answers "is this host up and administratively reachable" with two
//! independent signals:
//! * **network liveness**: the host answers on the network at all.
//! * **management handshake**: the remote-management endpoint accepts connections.
//!
//! A host can answer the first while the second is down, so both are always
//! evaluated and reported separately. Each signal is a single attempt bounded
//! by the probe timeout; an elapsed timeout is a `false`, never an error.

use std::time::Duration;

use async_trait::async_trait;
use fleetcheck_common::debug;
use fleetcheck_common::host::Host;
use fleetcheck_common::report::ReachabilityStatus;
use tokio::time::timeout;

pub mod tcp;

pub use tcp::{TcpLivenessProbe, TcpManagementProbe};

/// One reachability signal.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &'static str;

    async fn probe(&self, host: &Host) -> anyhow::Result<bool>;
}

/// Produces the full reachability status of a host.
///
/// This is the seam the fleet dispatcher depends on.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &Host) -> ReachabilityStatus;
}

/// Combines a network probe and a management probe under a shared timeout.
pub struct ReachabilityProber {
    network: Box<dyn Probe>,
    management: Box<dyn Probe>,
    probe_timeout: Duration,
}

impl ReachabilityProber {
    pub fn new(network: Box<dyn Probe>, management: Box<dyn Probe>, probe_timeout: Duration) -> Self {
        Self {
            network,
            management,
            probe_timeout,
        }
    }

    /// TCP based prober: liveness on `network_port`, handshake on `management_port`.
    pub fn tcp(network_port: u16, management_port: u16, probe_timeout: Duration) -> Self {
        Self::new(
            Box::new(TcpLivenessProbe::new(network_port)),
            Box::new(TcpManagementProbe::new(management_port)),
            probe_timeout,
        )
    }
}

#[async_trait]
impl Prober for ReachabilityProber {
    async fn probe(&self, host: &Host) -> ReachabilityStatus {
        let (network, management) = tokio::join!(
            bounded(self.network.as_ref(), host, self.probe_timeout),
            bounded(self.management.as_ref(), host, self.probe_timeout),
        );
        debug!(host = %host.name, network, management, "reachability probed");
        ReachabilityStatus::new(network, management)
    }
}

async fn bounded(probe: &dyn Probe, host: &Host, limit: Duration) -> bool {
    match timeout(limit, probe.probe(host)).await {
        Ok(Ok(up)) => up,
        Ok(Err(e)) => {
            debug!(host = %host.name, probe = probe.label(), "probe error: {e:#}");
            false
        }
        Err(_elapsed) => {
            debug!(host = %host.name, probe = probe.label(), "probe timed out after {limit:?}");
            false
        }
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
