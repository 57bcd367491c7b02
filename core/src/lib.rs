//! Fleet inventory and health-check engine.
//!
//! Host list in, [`FleetReport`](fleetcheck_common::report::FleetReport) out:
//! each host is probed, checked over a remote session with per-check failure
//! isolation, and the per-host outcomes are merged into one normalized report.

pub mod aggregate;
pub mod dispatcher;
pub mod executor;
pub mod probe;
pub mod registry;
pub mod session;
pub mod signal;

pub use aggregate::aggregate;
pub use dispatcher::{DispatchOutcome, FleetDispatcher};
pub use executor::{CheckRunner, HostExecutor, HostOutcome};
pub use probe::{Probe, Prober, ReachabilityProber};
pub use registry::{CheckRegistry, CheckSpec, RegistryError, ScriptCheck};
pub use session::{CommandTransport, RemoteSession, SessionFactory};
pub use signal::StopSignal;
