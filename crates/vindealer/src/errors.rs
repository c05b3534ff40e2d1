use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while handling a tool call.
///
/// These are carried as data inside tool requests and responses so the model
/// can read them and explain the problem, rather than failing the whole reply.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
