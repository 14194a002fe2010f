//! Router configuration, built once at startup and passed in explicitly

use serde::{Deserialize, Serialize};

use crate::registry::ChildAgentRegistry;

/// Which events the router accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerMode {
    /// Dispatch on the event's mode flags
    #[default]
    Dual,
    /// Treat every event as a routing request
    RouteOnly,
}

impl std::fmt::Display for HandlerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerMode::Dual => f.write_str("dual"),
            HandlerMode::RouteOnly => f.write_str("route-only"),
        }
    }
}

/// Seconds a persisted conversation context stays alive
pub const CONTEXT_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: HandlerMode,
    /// Table the conversation context is written to
    #[serde(default = "default_state_table")]
    pub state_table: String,
    #[serde(default)]
    pub child_agents: ChildAgentRegistry,
}

fn default_state_table() -> String {
    "AgentState".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: HandlerMode::default(),
            state_table: default_state_table(),
            child_agents: ChildAgentRegistry::default(),
        }
    }
}

impl RouterConfig {
    pub fn new(
        mode: HandlerMode,
        state_table: impl Into<String>,
        child_agents: ChildAgentRegistry,
    ) -> Self {
        Self {
            mode,
            state_table: state_table.into(),
            child_agents,
        }
    }
}
