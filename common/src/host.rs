//! # Fleet Host Model
//!
//! A host is the unit of work for a fleet run. Hosts arrive already resolved
//! from topology discovery and are never mutated during a run.
//!
//! This module also owns the [`IgnoreList`], which decides up front which
//! hosts are skipped entirely.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::warn;

/// Static attributes supplied by topology discovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAttributes {
    /// Holds a directory-service role (domain controller).
    pub role_holder: bool,
    /// Serves as a global catalog.
    pub global_catalog: bool,
    /// Minimal installation without the desktop shell.
    pub server_core: bool,
    /// Marked for exclusion by the topology collaborator.
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub attributes: HostAttributes,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            attributes: HostAttributes::default(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_attributes(mut self, attributes: HostAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Canonical identity used for ordering and deduplication.
    ///
    /// Host names are case-insensitive on the target platform.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Address used for network connections, falling back to the name.
    pub fn connect_addr(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(addr) if !addr.eq_ignore_ascii_case(&self.name) => {
                write!(f, "{} ({})", self.name, addr)
            }
            _ => write!(f, "{}", self.name),
        }
    }
}

/// On-disk shape of a host list: `[[host]]` tables in TOML or `{"host": [...]}` in JSON.
#[derive(Debug, Default, Deserialize)]
pub struct HostList {
    #[serde(default, rename = "host")]
    pub hosts: Vec<Host>,
}

/// Collapses case-insensitive duplicates, keeping the first occurrence.
pub fn dedup_hosts(hosts: Vec<Host>) -> Vec<Host> {
    let mut seen: HashSet<String> = HashSet::new();
    hosts
        .into_iter()
        .filter(|host| {
            let fresh = seen.insert(host.key());
            if !fresh {
                warn!("Dropping duplicate host entry {}", host.name);
            }
            fresh
        })
        .collect()
}

/// Names or addresses to exclude from a run.
#[derive(Debug, Default, Clone)]
pub struct IgnoreList {
    entries: HashSet<String>,
}

impl IgnoreList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// True when the host is listed by name or address, or flagged as excluded.
    pub fn matches(&self, host: &Host) -> bool {
        if host.attributes.excluded {
            return true;
        }
        if self.entries.contains(&host.key()) {
            return true;
        }
        host.address
            .as_deref()
            .is_some_and(|addr| self.entries.contains(&addr.to_ascii_lowercase()))
    }
}
