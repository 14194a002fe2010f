//! Agent invocation backend
//!
//! The managed agent service is an external collaborator. The router talks to
//! it through [`AgentBackend`]; [`SimulatedAgentBackend`] answers with canned
//! text so the full request cycle can run without the service.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::types::AgentRequest;

#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Ask the supervisor agent to analyze the user's request
    async fn invoke_supervisor(&self, request: &AgentRequest) -> Result<String>;

    /// Run the selected child agent on the user's request
    async fn invoke_child_agent(&self, request: &AgentRequest) -> Result<String>;

    /// Produce the final user-facing answer
    async fn format_response(&self, request: &AgentRequest) -> Result<String>;
}

/// Canned responses in place of real agent calls
#[derive(Debug, Clone, Default)]
pub struct SimulatedAgentBackend;

impl SimulatedAgentBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentBackend for SimulatedAgentBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn invoke_supervisor(&self, request: &AgentRequest) -> Result<String> {
        debug!(
            "Simulating supervisor {:?} for session {}",
            request.agent_id, request.session_id
        );
        Ok(format!(
            "I've analyzed your request: \"{}\". \n    This appears to be related to Data Analysis. \
             I'll route this to our Data Analysis specialist.",
            request.user_input
        ))
    }

    async fn invoke_child_agent(&self, request: &AgentRequest) -> Result<String> {
        debug!(
            "Simulating child agent {:?} for session {}",
            request.agent_id, request.session_id
        );
        Ok(format!(
            "As a specialized agent, I've analyzed your request: \"{}\".\n    \
             Here's my detailed response based on my expertise...",
            request.user_input
        ))
    }

    async fn format_response(&self, request: &AgentRequest) -> Result<String> {
        Ok(format!(
            "Here's the formatted response for you: {}",
            request.user_input
        ))
    }
}
