//! Invocation events and responses
//!
//! The wire format carries boolean mode flags; internally an event is a
//! [`RouterEvent`] variant chosen once at the edge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HandlerMode;
use crate::error::RouterError;

/// Supervisor output embedded in a routing event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorResponse {
    #[serde(default)]
    pub completion: Option<String>,
}

/// Event as received from the invoking platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub supervisor_response: Option<SupervisorResponse>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub is_initial_request: Option<Value>,
    #[serde(default)]
    pub is_child_agent: Option<Value>,
    #[serde(default)]
    pub is_formatting: Option<Value>,
}

/// Request for one of the stubbed agent calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub session_id: String,
    pub user_input: String,
    pub agent_id: Option<String>,
}

/// Request for a routing decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub session_id: String,
    pub user_input: String,
    pub supervisor_completion: String,
}

/// One invocation, by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// Initial request handled by the supervisor agent
    Supervisor(AgentRequest),
    /// Pick a child agent from the supervisor's recommendation
    Route(RouteRequest),
    /// Forward the prepared prompt to a child agent
    ChildAgent(AgentRequest),
    /// Shape the final answer for the user
    Format(AgentRequest),
}

impl RouterEvent {
    /// Short name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RouterEvent::Supervisor(_) => "supervisor",
            RouterEvent::Route(_) => "route",
            RouterEvent::ChildAgent(_) => "child_agent",
            RouterEvent::Format(_) => "format",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            RouterEvent::Supervisor(r) | RouterEvent::ChildAgent(r) | RouterEvent::Format(r) => {
                &r.session_id
            }
            RouterEvent::Route(r) => &r.session_id,
        }
    }

    /// Decode a raw JSON event.
    ///
    /// In [`HandlerMode::Dual`] the flags are checked in the order
    /// `isInitialRequest`, `isChildAgent`, `isFormatting`; an event with none
    /// set is a routing request. In [`HandlerMode::RouteOnly`] flags are ignored.
    pub fn from_value(value: Value, mode: HandlerMode) -> Result<Self, RouterError> {
        if !value.is_object() {
            return Err(RouterError::InvalidEvent("event must be a JSON object".to_string()));
        }
        let raw: RawEvent =
            serde_json::from_value(value).map_err(|e| RouterError::InvalidEvent(e.to_string()))?;
        Self::from_raw(raw, mode)
    }

    pub fn from_raw(raw: RawEvent, mode: HandlerMode) -> Result<Self, RouterError> {
        if mode == HandlerMode::Dual {
            if is_truthy(raw.is_initial_request.as_ref()) {
                return Ok(RouterEvent::Supervisor(agent_request(raw)));
            }
            if is_truthy(raw.is_child_agent.as_ref()) {
                return Ok(RouterEvent::ChildAgent(agent_request(raw)));
            }
            if is_truthy(raw.is_formatting.as_ref()) {
                return Ok(RouterEvent::Format(agent_request(raw)));
            }
        }

        let supervisor_completion = raw
            .supervisor_response
            .and_then(|s| s.completion)
            .ok_or_else(|| {
                RouterError::InvalidEvent("missing supervisorResponse.completion".to_string())
            })?;

        Ok(RouterEvent::Route(RouteRequest {
            session_id: raw.session_id.unwrap_or_default(),
            user_input: raw.user_input.unwrap_or_default(),
            supervisor_completion,
        }))
    }
}

fn agent_request(raw: RawEvent) -> AgentRequest {
    AgentRequest {
        session_id: raw.session_id.unwrap_or_default(),
        user_input: raw.user_input.unwrap_or_default(),
        agent_id: raw.agent_id,
    }
}

/// Loose truthiness for mode flags: `true`, non-zero numbers and non-empty
/// strings count as set.
fn is_truthy(flag: Option<&Value>) -> bool {
    match flag {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Outcome of a routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub selected_agent_id: String,
    pub selected_agent_index: usize,
    pub formatted_prompt: String,
    pub original_query: String,
}

/// Reply from the supervisor stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorReply {
    pub completion: String,
    pub session_id: String,
}

/// Reply from the child agent or formatting stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub response: String,
    pub session_id: String,
}

/// Whatever the invocation produced, serialized without a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RouterResponse {
    Routed(RoutingDecision),
    Supervisor(SupervisorReply),
    Agent(AgentReply),
}
