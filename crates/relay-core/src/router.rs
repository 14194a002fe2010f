//! Request router — one handler per event kind
//!
//! Only the routing path carries real logic: extract the supervisor's
//! recommendation, resolve it to a configured child agent, build the child
//! prompt, and persist the decision. The other kinds delegate to the agent
//! backend.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::backend::AgentBackend;
use crate::config::{HandlerMode, RouterConfig};
use crate::error::RouterError;
use crate::prompt::format_child_prompt;
use crate::recommendation::extract_recommendation;
use crate::store::{ContextStore, ConversationContext, iso_timestamp, persist_context};
use crate::types::{
    AgentReply, AgentRequest, RouteRequest, RouterEvent, RouterResponse, RoutingDecision,
    SupervisorReply,
};

pub struct RequestRouter {
    config: Arc<RouterConfig>,
    store: Arc<dyn ContextStore>,
    backend: Arc<dyn AgentBackend>,
    invocations: AtomicU64,
}

impl RequestRouter {
    pub fn new(
        config: RouterConfig,
        store: Arc<dyn ContextStore>,
        backend: Arc<dyn AgentBackend>,
    ) -> Self {
        info!(
            "RequestRouter: mode={}, {} child agents, state table '{}' on {}, backend {}",
            config.mode,
            config.child_agents.len(),
            config.state_table,
            store.name(),
            backend.name()
        );
        for (key, agent_id) in config.child_agents.iter() {
            debug!("Child agent {} => {}", key, agent_id);
        }
        Self {
            config: Arc::new(config),
            store,
            backend,
            invocations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn mode(&self) -> HandlerMode {
        self.config.mode
    }

    /// Number of events handled since startup, successful or not
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Decode and handle a raw JSON event
    pub async fn handle_value(&self, event: Value) -> Result<RouterResponse, RouterError> {
        debug!(
            "Event received: {}",
            serde_json::to_string_pretty(&event).unwrap_or_default()
        );
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let event = RouterEvent::from_value(event, self.config.mode).inspect_err(|e| {
            error!("Rejected event: {}", e);
        })?;
        self.dispatch(event).await
    }

    /// Handle one already-decoded event
    pub async fn handle(&self, event: RouterEvent) -> Result<RouterResponse, RouterError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.dispatch(event).await
    }

    async fn dispatch(&self, event: RouterEvent) -> Result<RouterResponse, RouterError> {
        let span = info_span!(
            "invocation",
            request_id = %Uuid::new_v4(),
            kind = event.kind(),
            session_id = %event.session_id(),
        );

        async move {
            let result = match event {
                RouterEvent::Supervisor(req) => self.handle_supervisor(req).await,
                RouterEvent::Route(req) => self.route_to_child_agent(req).await,
                RouterEvent::ChildAgent(req) => self.handle_child_agent(req).await,
                RouterEvent::Format(req) => self.handle_format(req).await,
            };
            if let Err(e) = &result {
                error!("Invocation failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn handle_supervisor(&self, req: AgentRequest) -> Result<RouterResponse, RouterError> {
        let completion = self
            .backend
            .invoke_supervisor(&req)
            .await
            .map_err(RouterError::Backend)?;
        Ok(RouterResponse::Supervisor(SupervisorReply {
            completion,
            session_id: req.session_id,
        }))
    }

    async fn handle_child_agent(&self, req: AgentRequest) -> Result<RouterResponse, RouterError> {
        let response = self
            .backend
            .invoke_child_agent(&req)
            .await
            .map_err(RouterError::Backend)?;
        Ok(RouterResponse::Agent(AgentReply {
            response,
            session_id: req.session_id,
        }))
    }

    async fn handle_format(&self, req: AgentRequest) -> Result<RouterResponse, RouterError> {
        let response = self
            .backend
            .format_response(&req)
            .await
            .map_err(RouterError::Backend)?;
        Ok(RouterResponse::Agent(AgentReply {
            response,
            session_id: req.session_id,
        }))
    }

    async fn route_to_child_agent(&self, req: RouteRequest) -> Result<RouterResponse, RouterError> {
        let decision = self.decide(&req)?;

        let context = ConversationContext {
            user_input: req.user_input.clone(),
            supervisor_response: req.supervisor_completion.clone(),
            selected_agent_index: decision.selected_agent_index,
            selected_agent_id: decision.selected_agent_id.clone(),
            timestamp: iso_timestamp(Utc::now()),
        };
        if persist_context(self.store.as_ref(), &req.session_id, context)
            .await
            .is_err()
        {
            debug!("Continuing without persisted context");
        }

        Ok(RouterResponse::Routed(decision))
    }

    /// The pure part of routing: no I/O, no side effects
    pub fn decide(&self, req: &RouteRequest) -> Result<RoutingDecision, RouterError> {
        let category = extract_recommendation(&req.supervisor_completion);
        let selected = self.config.child_agents.select(category)?;
        info!(
            "Routing to {} agent '{}' (index {})",
            category, selected.agent_id, selected.index
        );

        Ok(RoutingDecision {
            selected_agent_id: selected.agent_id,
            selected_agent_index: selected.index,
            formatted_prompt: format_child_prompt(
                category,
                &req.user_input,
                &req.supervisor_completion,
            ),
            original_query: req.user_input.clone(),
        })
    }
}
