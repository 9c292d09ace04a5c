//! Domain Layer - Agent Errors

use serde::{Deserialize, Serialize};

/// Common result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentError {
    /// A network fetch failed and no cached copy could stand in
    Network(String),
    /// A manifest asset could not be precached; the install was aborted
    Precache { url: String, reason: String },
    /// The cache storage refused an operation
    Cache(String),
    /// The agent configuration is unusable
    Config(String),
    /// An operation was attempted in the wrong lifecycle state
    Lifecycle(String),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Network(msg) => write!(f, "Network error: {}", msg),
            AgentError::Precache { url, reason } => write!(f, "Precache of {} failed: {}", url, reason),
            AgentError::Cache(msg) => write!(f, "Cache error: {}", msg),
            AgentError::Config(msg) => write!(f, "Invalid config: {}", msg),
            AgentError::Lifecycle(msg) => write!(f, "Lifecycle error: {}", msg),
        }
    }
}

impl std::error::Error for AgentError {}
