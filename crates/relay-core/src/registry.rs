//! Child agent registry and agent selection
//!
//! The registry maps stringified indices ("0", "1", ...) to opaque agent
//! identifiers. It is loaded once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::RouterError;
use crate::recommendation::AgentCategory;

/// Index used when the recommended category has no configured slot
pub const FALLBACK_INDEX: usize = 0;

/// Immutable mapping from agent index to agent identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildAgentRegistry {
    agents: BTreeMap<String, String>,
}

/// Result of resolving a category against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAgent {
    pub index: usize,
    pub agent_id: String,
}

impl ChildAgentRegistry {
    /// Parse a registry from a JSON object such as `{"0": "agent-a"}`.
    ///
    /// Every value must be a string; anything else is rejected rather than
    /// silently coerced.
    pub fn from_json(raw: &str) -> Result<Self, RouterError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| RouterError::InvalidRegistry(e.to_string()))?;

        let object = value.as_object().ok_or_else(|| {
            RouterError::InvalidRegistry("expected a JSON object of index → agent id".to_string())
        })?;

        let mut agents = BTreeMap::new();
        for (key, value) in object {
            let id = value.as_str().ok_or_else(|| {
                RouterError::InvalidRegistry(format!("agent id for key '{}' is not a string", key))
            })?;
            agents.insert(key.clone(), id.to_string());
        }

        Ok(Self { agents })
    }

    /// Number of configured entries (keys), used as the agent count
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent identifier stored under the stringified index, if non-empty
    pub fn get(&self, index: usize) -> Option<&str> {
        self.agents
            .get(&index.to_string())
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Iterate over `(key, agent id)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.agents.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve a category to a configured agent.
    ///
    /// Uses the category's index when it is below the agent count, otherwise
    /// falls back to index 0. Fails only when the chosen index has no agent.
    pub fn select(&self, category: AgentCategory) -> Result<SelectedAgent, RouterError> {
        let index = select_index(category, self.len());
        match self.get(index) {
            Some(agent_id) => {
                debug!("Selected agent '{}' at index {} for {}", agent_id, index, category);
                Ok(SelectedAgent {
                    index,
                    agent_id: agent_id.to_string(),
                })
            }
            None => {
                warn!("No agent configured at index {} (registry size {})", index, self.len());
                Err(RouterError::NoAgentForIndex { index })
            }
        }
    }
}

/// Map a category to an index, falling back when it exceeds the agent count
pub fn select_index(category: AgentCategory, agent_count: usize) -> usize {
    let index = category.index();
    if index < agent_count {
        index
    } else {
        FALLBACK_INDEX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_agents() -> ChildAgentRegistry {
        ChildAgentRegistry::from_json(r#"{"0":"agent-data","1":"agent-code","2":"agent-infra"}"#)
            .unwrap()
    }

    #[test]
    fn test_select_index_in_range() {
        assert_eq!(select_index(AgentCategory::CodeGeneration, 3), 1);
        assert_eq!(select_index(AgentCategory::InfrastructurePlanning, 3), 2);
    }

    #[test]
    fn test_select_index_out_of_range_falls_back() {
        assert_eq!(select_index(AgentCategory::InfrastructurePlanning, 2), 0);
        assert_eq!(select_index(AgentCategory::CodeGeneration, 1), 0);
        assert_eq!(select_index(AgentCategory::CodeGeneration, 0), 0);
    }

    #[test]
    fn test_select_code_generation() {
        let selected = three_agents().select(AgentCategory::CodeGeneration).unwrap();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.agent_id, "agent-code");
    }

    #[test]
    fn test_select_falls_back_to_first_agent() {
        let registry = ChildAgentRegistry::from_json(r#"{"0":"only"}"#).unwrap();
        let selected = registry.select(AgentCategory::InfrastructurePlanning).unwrap();
        assert_eq!(selected.index, 0);
        assert_eq!(selected.agent_id, "only");
    }

    #[test]
    fn test_empty_registry_is_configuration_error() {
        let registry = ChildAgentRegistry::default();
        let err = registry.select(AgentCategory::DataAnalysis).unwrap_err();
        assert!(matches!(err, RouterError::NoAgentForIndex { index: 0 }));
    }

    #[test]
    fn test_sparse_keys_count_but_do_not_resolve() {
        // Two keys means Code Generation keeps index 1, which has no entry
        let registry = ChildAgentRegistry::from_json(r#"{"0":"a","5":"b"}"#).unwrap();
        let err = registry.select(AgentCategory::CodeGeneration).unwrap_err();
        assert!(matches!(err, RouterError::NoAgentForIndex { index: 1 }));
    }

    #[test]
    fn test_empty_id_is_treated_as_missing() {
        let registry = ChildAgentRegistry::from_json(r#"{"0":""}"#).unwrap();
        assert!(registry.get(0).is_none());
        assert!(registry.select(AgentCategory::DataAnalysis).is_err());
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = ChildAgentRegistry::from_json("[\"a\"]").unwrap_err();
        assert!(matches!(err, RouterError::InvalidRegistry(_)));
    }

    #[test]
    fn test_from_json_rejects_non_string_id() {
        let err = ChildAgentRegistry::from_json(r#"{"0": 42}"#).unwrap_err();
        assert!(err.to_string().contains("not a string"));
    }

    #[test]
    fn test_iter_in_key_order() {
        let registry = three_agents();
        let keys: Vec<&str> = registry.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0", "1", "2"]);
    }
}
