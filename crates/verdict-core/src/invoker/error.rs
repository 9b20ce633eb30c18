//! Error types for agent invocation.

use serde::{Deserialize, Serialize};

/// Coarse classification used by the orchestrator and the execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorClass {
    /// Transport failure or timeout.
    Invocation,
    /// The agent answered but the payload does not fit the expected shape.
    Parsing,
}

impl AgentErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentErrorClass::Invocation => "invocation",
            AgentErrorClass::Parsing => "parsing",
        }
    }
}

/// Classified failure of a single agent call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent invocation failed for {target}: {detail}")]
    Invocation { target: String, detail: String },

    #[error("agent call for {target} timed out after {timeout_ms} ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("agent response for {target} could not be parsed: {detail}")]
    Parsing { target: String, detail: String },
}

impl AgentError {
    pub fn invocation(target: impl Into<String>, detail: impl Into<String>) -> Self {
        AgentError::Invocation {
            target: target.into(),
            detail: detail.into(),
        }
    }

    pub fn parsing(target: impl Into<String>, detail: impl Into<String>) -> Self {
        AgentError::Parsing {
            target: target.into(),
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> AgentErrorClass {
        match self {
            AgentError::Invocation { .. } | AgentError::Timeout { .. } => {
                AgentErrorClass::Invocation
            }
            AgentError::Parsing { .. } => AgentErrorClass::Parsing,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            AgentError::Invocation { target, .. }
            | AgentError::Timeout { target, .. }
            | AgentError::Parsing { target, .. } => target,
        }
    }
}

/// Result type for agent calls.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
