//! relay-core - routes supervisor recommendations to child agents
//!
//! This crate provides:
//! - Event model with one variant per invocation kind
//! - Keyword-based recommendation extraction and agent selection
//! - Child agent prompt formatting
//! - Best-effort conversation context persistence (memory and SQLite stores)
//! - A simulated agent backend standing in for the managed agent service

pub mod backend;
pub mod config;
pub mod error;
pub mod prompt;
pub mod recommendation;
pub mod registry;
pub mod router;
pub mod sqlite;
pub mod store;
pub mod types;

pub use backend::{AgentBackend, SimulatedAgentBackend};
pub use config::{CONTEXT_TTL_SECS, HandlerMode, RouterConfig};
pub use error::RouterError;
pub use prompt::format_child_prompt;
pub use recommendation::{AgentCategory, extract_recommendation};
pub use registry::{ChildAgentRegistry, SelectedAgent};
pub use router::RequestRouter;
pub use sqlite::SqliteContextStore;
pub use store::{
    ContextRecord, ContextStore, ConversationContext, MemoryContextStore, persist_context,
};
pub use types::{
    AgentReply, AgentRequest, RouteRequest, RouterEvent, RouterResponse, RoutingDecision,
    SupervisorReply,
};
