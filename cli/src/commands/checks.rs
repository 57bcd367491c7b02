use colored::*;
use fleetcheck_common::config::{CheckScope, Config};
use fleetcheck_core::CheckRegistry;

use crate::terminal::{colors, print};

/// Lists the registry in execution order.
pub fn checks(cfg: &Config, quiet: u8) -> anyhow::Result<()> {
    let registry = CheckRegistry::with_definitions(cfg.checks.clone())?;

    print::header("registered checks", quiet);
    let rows = registry
        .describe()
        .into_iter()
        .map(|(name, scope)| {
            let scope = scope.unwrap_or(CheckScope::All).to_string();
            (name.to_string(), scope.color(colors::ACCENT))
        })
        .collect();
    print::as_tree_one_level(rows);
    Ok(())
}
