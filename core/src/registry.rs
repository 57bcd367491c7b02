//! # Check Registry
//!
//! The ordered battery of checks run against every reachable host.
//!
//! A check is a named description with an applicability predicate and an
//! execute callback. Applicability is always evaluated first: an inapplicable
//! check is recorded as skipped and never counts against the host.
//!
//! The registry is assembled once at startup and shared read-only between
//! host pipelines; checks hold no per-host state.

use std::sync::Arc;

use async_trait::async_trait;
use fleetcheck_common::config::{CheckDefinition, CheckScope};
use fleetcheck_common::host::Host;
use serde_json::Value;
use thiserror::Error;

use crate::session::RemoteSession;

mod builtin;

pub const NOT_APPLICABLE: &str = "not applicable";

#[async_trait]
pub trait CheckSpec: Send + Sync {
    fn name(&self) -> &str;

    fn applies_to(&self, host: &Host) -> bool;

    /// Declared scope, when the check is scope-driven.
    fn scope(&self) -> Option<CheckScope> {
        None
    }

    /// Reason recorded when [`CheckSpec::applies_to`] is false.
    fn skip_reason(&self, _host: &Host) -> String {
        NOT_APPLICABLE.to_string()
    }

    /// Runs the check through the host's session. Must not modify the host.
    async fn execute(&self, host: &Host, session: &dyn RemoteSession) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a check named {0:?} is already registered")]
    DuplicateCheck(String),
}

/// A check that runs a fixed script and returns its output as the payload.
#[derive(Debug, Clone)]
pub struct ScriptCheck {
    name: String,
    script: String,
    scope: CheckScope,
}

impl ScriptCheck {
    pub fn new(name: impl Into<String>, script: impl Into<String>, scope: CheckScope) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            scope,
        }
    }
}

impl From<CheckDefinition> for ScriptCheck {
    fn from(def: CheckDefinition) -> Self {
        Self::new(def.name, def.script, def.scope)
    }
}

#[async_trait]
impl CheckSpec for ScriptCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, host: &Host) -> bool {
        self.scope.covers(host)
    }

    fn scope(&self) -> Option<CheckScope> {
        Some(self.scope)
    }

    fn skip_reason(&self, _host: &Host) -> String {
        format!("{NOT_APPLICABLE}: requires {}", self.scope)
    }

    async fn execute(&self, _host: &Host, session: &dyn RemoteSession) -> anyhow::Result<Value> {
        session.invoke(&self.script).await
    }
}

#[derive(Default, Clone)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn CheckSpec>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in battery, in report order.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for check in builtin::battery() {
            registry.checks.push(Arc::new(check));
        }
        registry
    }

    /// Built-in battery followed by configured script checks.
    pub fn with_definitions(definitions: Vec<CheckDefinition>) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for def in definitions {
            registry.register(ScriptCheck::from(def))?;
        }
        Ok(registry)
    }

    pub fn register<C>(&mut self, check: C) -> Result<(), RegistryError>
    where
        C: CheckSpec + 'static,
    {
        self.register_arc(Arc::new(check))
    }

    pub fn register_arc(&mut self, check: Arc<dyn CheckSpec>) -> Result<(), RegistryError> {
        if self.contains(check.name()) {
            return Err(RegistryError::DuplicateCheck(check.name().to_string()));
        }
        self.checks.push(check);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.iter().any(|check| check.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CheckSpec>> {
        self.checks.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Name and declared scope of every check, for listings.
    pub fn describe(&self) -> Vec<(&str, Option<CheckScope>)> {
        self.checks
            .iter()
            .map(|check| (check.name(), check.scope()))
            .collect()
    }
}
