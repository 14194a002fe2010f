//! Errors surfaced to the caller of a routing invocation

use thiserror::Error;

/// Failures that abort an invocation.
///
/// Persistence failures are deliberately absent: they are logged by the
/// router and never reach the caller.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No agent identifier is configured at the selected (or fallback) index
    #[error("No agent found for index {index}")]
    NoAgentForIndex { index: usize },

    /// The child agent registry could not be parsed
    #[error("invalid child agent registry: {0}")]
    InvalidRegistry(String),

    /// The incoming event is missing a required field or is not an object
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The agent backend failed to produce a response
    #[error("agent backend error: {0:#}")]
    Backend(anyhow::Error),
}

impl RouterError {
    /// True for errors caused by configuration rather than input or backend
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RouterError::NoAgentForIndex { .. } | RouterError::InvalidRegistry(_)
        )
    }
}
