//! Run configuration.
//!
//! Loaded from TOML, then overridden field by field from the command line.
//! Every field has a default so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::host::Host;

const MIN_DERIVED_CONCURRENCY: usize = 4;
const MAX_DERIVED_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound of simultaneously running host pipelines.
    /// Derived from the fleet size when unset.
    pub concurrency: Option<usize>,
    pub probe_timeout_ms: u64,
    pub session_timeout_ms: u64,
    pub check_timeout_ms: u64,
    pub verbose: bool,
    /// Host names or addresses to leave out of the run.
    pub ignore: Vec<String>,
    /// Port used for the network liveness probe.
    pub network_port: u16,
    /// Port of the remote-management endpoint.
    pub management_port: u16,
    pub transport: TransportConfig,
    /// Script checks appended to the built-in battery.
    pub checks: Vec<CheckDefinition>,
}

/// Long-lived local shell that holds one host's remote session.
///
/// `program` and `args` start a shell reading commands from stdin, one per
/// line. The templates are sent to it with `{host}`, `{script}` and
/// `{marker}` substituted:
/// * `open` establishes the remote session,
/// * `invoke` runs one check script inside it,
/// * `close` releases it before the shell is shut down.
///
/// Each template must end by printing `{marker} OK` or `{marker} ERR` on a
/// line of its own. Whatever it printed before that line is the result, or
/// the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub program: String,
    pub args: Vec<String>,
    pub open: String,
    pub invoke: String,
    pub close: String,
}

/// Which hosts a script check is meaningful for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckScope {
    #[default]
    All,
    RoleHolders,
    GlobalCatalog,
    /// Requires the desktop shell; not available on minimal installations.
    FullInstallation,
}

impl CheckScope {
    pub fn covers(&self, host: &Host) -> bool {
        match self {
            CheckScope::All => true,
            CheckScope::RoleHolders => host.attributes.role_holder,
            CheckScope::GlobalCatalog => host.attributes.global_catalog,
            CheckScope::FullInstallation => !host.attributes.server_core,
        }
    }
}

impl fmt::Display for CheckScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckScope::All => write!(f, "all hosts"),
            CheckScope::RoleHolders => write!(f, "role holders"),
            CheckScope::GlobalCatalog => write!(f, "global catalogs"),
            CheckScope::FullInstallation => write!(f, "full installations"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub scope: CheckScope,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: "pwsh".into(),
            args: vec![
                "-NoLogo".into(),
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                "-".into(),
            ],
            open: "try { $fleetSession = New-PSSession -ComputerName '{host}' -ErrorAction Stop; \
                   '{marker} OK' } catch { $_.Exception.Message; '{marker} ERR' }"
                .into(),
            invoke: "try { Invoke-Command -Session $fleetSession -ErrorAction Stop \
                     -ScriptBlock { {script} } | ConvertTo-Json -Depth 4 -Compress; \
                     '{marker} OK' } catch { $_.Exception.Message; '{marker} ERR' }"
                .into(),
            close: "try { Remove-PSSession -Session $fleetSession -ErrorAction Stop; \
                    '{marker} OK' } catch { $_.Exception.Message; '{marker} ERR' }"
                .into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: None,
            probe_timeout_ms: 1_500,
            session_timeout_ms: 15_000,
            check_timeout_ms: 60_000,
            verbose: false,
            ignore: Vec::new(),
            network_port: 135,
            management_port: 5985,
            transport: TransportConfig::default(),
            checks: Vec::new(),
        }
    }
}

impl Config {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Loads the configuration from `path`, or from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }
}

/// A quarter of the fleet, kept within sane bounds and never above the fleet size.
pub fn derive_concurrency(fleet_size: usize) -> usize {
    (fleet_size / 4)
        .clamp(MIN_DERIVED_CONCURRENCY, MAX_DERIVED_CONCURRENCY)
        .min(fleet_size)
        .max(1)
}

/// `$XDG_CONFIG_HOME/fleetcheck/config.toml` or `$HOME/.config/fleetcheck/config.toml`
fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_home)
    } else if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(base.join("fleetcheck/config.toml"))
}
