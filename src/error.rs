//! Typed errors for the recoverable failure classes
//!
//! None of these reach the caller of `Orchestrator::process`: discovery
//! errors fall back to the static table, invocation errors become failed
//! agent results, and classification errors become a fallback decision.

use thiserror::Error;

use crate::types::AgentId;

/// Registry discovery failed; the directory falls back to its static table
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("registry lookup for '{capability}' timed out after {secs}s")]
    Timeout { capability: String, secs: u64 },

    #[error("registry unreachable: {0}")]
    Transport(String),

    #[error("registry returned HTTP {status}")]
    Status { status: u16 },

    #[error("registry returned an unreadable body: {0}")]
    MalformedResponse(String),

    #[error("no live agent with capability '{0}'")]
    NoMatch(String),

    #[error("invalid agent_url '{url}': {reason}")]
    MalformedAddress { url: String, reason: String },
}

/// One agent call failed; recorded as a failed result for that agent
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{agent} timed out")]
    Timeout { agent: AgentId },

    #[error("{agent} unreachable: {message}")]
    Transport { agent: AgentId, message: String },

    #[error("{agent} returned HTTP {status}: {body}")]
    Status {
        agent: AgentId,
        status: u16,
        body: String,
    },

    #[error("{agent} sent an unreadable reply: {reason}")]
    MalformedReply { agent: AgentId, reason: String },
}

impl InvokeError {
    /// Classify a reqwest transport error
    pub fn from_transport(agent: AgentId, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InvokeError::Timeout { agent }
        } else if e.is_decode() {
            InvokeError::MalformedReply {
                agent,
                reason: e.to_string(),
            }
        } else {
            InvokeError::Transport {
                agent,
                message: e.to_string(),
            }
        }
    }

    pub fn agent(&self) -> AgentId {
        match self {
            InvokeError::Timeout { agent }
            | InvokeError::Transport { agent, .. }
            | InvokeError::Status { agent, .. }
            | InvokeError::MalformedReply { agent, .. } => *agent,
        }
    }
}

/// The classifier could not produce a valid routing decision
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification timed out after {0}s")]
    Timeout(u64),

    #[error("classification backend failed: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("classifier output is not valid JSON: {0}")]
    MalformedOutput(String),

    #[error("classifier output is missing '{0}'")]
    MissingField(&'static str),

    #[error("classifier returned unknown intent '{0}'")]
    UnknownIntent(String),

    #[error("classifier returned unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("classifier requested {0} agents (max 3)")]
    TooManyAgents(usize),
}
