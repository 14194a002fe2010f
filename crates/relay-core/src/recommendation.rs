//! Recommendation extraction
//!
//! Picks a child agent category out of the supervisor's free-text output by
//! plain substring matching. Matching is case-sensitive and checks the
//! categories in declaration order, so the first listed label that appears
//! anywhere in the text wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Specialist category a supervisor can recommend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentCategory {
    /// Fallback when the supervisor names no known category
    #[default]
    #[serde(rename = "Data Analysis")]
    DataAnalysis,
    #[serde(rename = "Code Generation")]
    CodeGeneration,
    #[serde(rename = "Infrastructure Planning")]
    InfrastructurePlanning,
}

impl AgentCategory {
    /// All categories in match order
    pub const ALL: [AgentCategory; 3] = [
        AgentCategory::DataAnalysis,
        AgentCategory::CodeGeneration,
        AgentCategory::InfrastructurePlanning,
    ];

    /// The label as it appears in supervisor output
    pub fn label(self) -> &'static str {
        match self {
            AgentCategory::DataAnalysis => "Data Analysis",
            AgentCategory::CodeGeneration => "Code Generation",
            AgentCategory::InfrastructurePlanning => "Infrastructure Planning",
        }
    }

    /// Registry index this category maps to before bounds checking
    pub fn index(self) -> usize {
        match self {
            AgentCategory::DataAnalysis => 0,
            AgentCategory::CodeGeneration => 1,
            AgentCategory::InfrastructurePlanning => 2,
        }
    }
}

impl fmt::Display for AgentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extract the recommended category from supervisor output.
///
/// Falls back to [`AgentCategory::DataAnalysis`] when no label is present.
pub fn extract_recommendation(supervisor_text: &str) -> AgentCategory {
    AgentCategory::ALL
        .into_iter()
        .find(|category| supervisor_text.contains(category.label()))
        .unwrap_or_default()
}
