pub mod checks;
pub mod probe;
pub mod run;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use fleetcheck_common::config::Config;
use fleetcheck_common::host::{Host, HostList};
use fleetcheck_common::report::TopologyFinding;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "fleetcheck")]
#[command(about = "Health checks across a fleet of directory servers.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.config/fleetcheck/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Less output; repeat for bare summaries
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe every host and run the check battery on the reachable ones
    #[command(alias = "r")]
    Run {
        #[command(flatten)]
        fleet: FleetArgs,
        /// JSON file of topology findings to attach to the report
        #[arg(long)]
        findings: Option<PathBuf>,
        /// Write the full report as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Reachability probes only
    #[command(alias = "p")]
    Probe {
        #[command(flatten)]
        fleet: FleetArgs,
    },
    /// List the registered checks
    #[command(alias = "c")]
    Checks,
}

#[derive(Args)]
pub struct FleetArgs {
    /// Host names to check
    pub hosts: Vec<String>,

    /// TOML or JSON file with `host` entries
    #[arg(short = 'f', long)]
    pub hosts_file: Option<PathBuf>,

    /// Host name or address to leave out (repeatable)
    #[arg(short, long)]
    pub ignore: Vec<String>,

    /// Maximum number of hosts processed at once
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Probe timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub probe_timeout: Option<u64>,

    /// Session setup timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub session_timeout: Option<u64>,

    /// Per-check timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub check_timeout: Option<u64>,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Loads the config file and lets global flags override it.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut cfg = Config::load(self.config.as_deref())?;
        cfg.verbose |= self.verbose;
        Ok(cfg)
    }
}

impl FleetArgs {
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(cap) = self.concurrency {
            cfg.concurrency = Some(cap);
        }
        if let Some(ms) = self.probe_timeout {
            cfg.probe_timeout_ms = ms;
        }
        if let Some(ms) = self.session_timeout {
            cfg.session_timeout_ms = ms;
        }
        if let Some(ms) = self.check_timeout {
            cfg.check_timeout_ms = ms;
        }
        cfg.ignore.extend(self.ignore.iter().cloned());
    }

    /// Hosts from the file first, then the positional ones.
    pub fn load_hosts(&self) -> anyhow::Result<Vec<Host>> {
        let mut hosts = match &self.hosts_file {
            Some(path) => read_host_file(path)?,
            None => Vec::new(),
        };
        hosts.extend(self.hosts.iter().map(Host::new));
        Ok(hosts)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonHosts {
    Table(HostList),
    Bare(Vec<Host>),
}

pub fn read_host_file(path: &Path) -> anyhow::Result<Vec<Host>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read host list {}", path.display()))?;

    if is_json(path) {
        let parsed: JsonHosts = serde_json::from_str(&raw)
            .with_context(|| format!("invalid host list {}", path.display()))?;
        return Ok(match parsed {
            JsonHosts::Table(list) => list.hosts,
            JsonHosts::Bare(hosts) => hosts,
        });
    }

    let list: HostList =
        toml::from_str(&raw).with_context(|| format!("invalid host list {}", path.display()))?;
    Ok(list.hosts)
}

pub fn read_findings(path: &Path) -> anyhow::Result<Vec<TopologyFinding>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read findings {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid findings file {}", path.display()))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
