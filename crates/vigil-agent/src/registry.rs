//! Agent factory registry.
//!
//! Maps an agent type name to a constructor. Agents are resolved by name
//! once, when the orchestrator loads its configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::agents::{AuditorAgent, TreasurerAgent, WatchtowerAgent};
use crate::error::{AgentError, AgentResult};
use crate::payload::{AUDITOR, TREASURER, WATCHTOWER};

/// Agent-specific configuration options
pub type AgentOptions = serde_json::Map<String, Value>;

/// Builds agent instances of one type
pub trait AgentFactory: Send + Sync {
    /// Create a fresh instance from its options
    fn build(&self, options: &AgentOptions) -> AgentResult<Arc<dyn Agent>>;
}

impl<F> AgentFactory for F
where
    F: Fn(&AgentOptions) -> AgentResult<Arc<dyn Agent>> + Send + Sync,
{
    fn build(&self, options: &AgentOptions) -> AgentResult<Arc<dyn Agent>> {
        self(options)
    }
}

/// Registry of agent factories keyed by agent type name
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: HashMap<String, Arc<dyn AgentFactory>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the watchtower, auditor and treasurer agents
    pub fn with_builtin_agents() -> Self {
        let mut registry = Self::new();
        registry.register(WATCHTOWER, |_: &AgentOptions| -> AgentResult<Arc<dyn Agent>> {
            Ok(Arc::new(WatchtowerAgent::new()))
        });
        registry.register(AUDITOR, |options: &AgentOptions| -> AgentResult<Arc<dyn Agent>> {
            Ok(Arc::new(AuditorAgent::from_options(options)?))
        });
        registry.register(TREASURER, |_: &AgentOptions| -> AgentResult<Arc<dyn Agent>> {
            Ok(Arc::new(TreasurerAgent::new()))
        });
        registry
    }

    /// Register (or replace) the factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: impl AgentFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build a new instance of the agent type `name`
    pub fn create(&self, name: &str, options: &AgentOptions) -> AgentResult<Arc<dyn Agent>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AgentError::UnknownAgentType(name.to_string()))?;
        factory.build(options)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
