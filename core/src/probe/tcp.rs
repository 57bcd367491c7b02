use std::io::ErrorKind;

use async_trait::async_trait;
use fleetcheck_common::host::Host;
use tokio::net::TcpStream;

use super::Probe;

/// Network liveness over a single TCP connect.
///
/// An actively refused connection still proves the host is up; only
/// silence (timeout) or routing errors count as down.
pub struct TcpLivenessProbe {
    port: u16,
}

impl TcpLivenessProbe {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Probe for TcpLivenessProbe {
    fn label(&self) -> &'static str {
        "network"
    }

    async fn probe(&self, host: &Host) -> anyhow::Result<bool> {
        match TcpStream::connect((host.connect_addr(), self.port)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

/// Remote-management handshake: the endpoint must accept the connection.
pub struct TcpManagementProbe {
    port: u16,
}

impl TcpManagementProbe {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Probe for TcpManagementProbe {
    fn label(&self) -> &'static str {
        "management"
    }

    async fn probe(&self, host: &Host) -> anyhow::Result<bool> {
        match TcpStream::connect((host.connect_addr(), self.port)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
