//! Remote-execution sessions.
//!
//! A session is the shared precondition of every check on a host: it is
//! opened once per host pipeline, borrowed by each check, and closed on every
//! exit path. Sessions are never shared across hosts.

use std::sync::Arc;

use async_trait::async_trait;
use fleetcheck_common::host::Host;
use serde_json::Value;

pub mod command;

pub use command::CommandTransport;

/// A live remote-execution context for a single host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs a read-only script on the host and returns its structured output.
    async fn invoke(&self, script: &str) -> anyhow::Result<Value>;

    /// Releases the session. Called exactly once by the owning pipeline.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens sessions; failure here aborts the whole host.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, host: &Host) -> anyhow::Result<Arc<dyn RemoteSession>>;
}
