//! Shared types used across modules
//!
//! Agent identities, intents, routing decisions and per-agent results live
//! here so the directory, invoker, router and state machine can share them
//! without depending on each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A backend agent the orchestrator knows how to call.
///
/// Declaration order is the synthesis order (alerts, stops, planner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "mbta-alerts")]
    Alerts,
    #[serde(rename = "mbta-stops")]
    Stops,
    #[serde(rename = "mbta-route-planner")]
    Planner,
}

impl AgentId {
    /// Logical name used on the wire and in logs
    pub fn name(&self) -> &'static str {
        match self {
            AgentId::Alerts => "mbta-alerts",
            AgentId::Stops => "mbta-stops",
            AgentId::Planner => "mbta-route-planner",
        }
    }

    /// Capability tag used to search the registry
    pub fn capability(&self) -> &'static str {
        match self {
            AgentId::Alerts => "alerts",
            AgentId::Stops => "stops",
            AgentId::Planner => "trip-planning",
        }
    }

    /// Short graph-node label
    pub fn label(&self) -> &'static str {
        match self {
            AgentId::Alerts => "alerts",
            AgentId::Stops => "stops",
            AgentId::Planner => "planner",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mbta-alerts" | "alerts" => Ok(AgentId::Alerts),
            "mbta-stops" | "stops" => Ok(AgentId::Stops),
            "mbta-route-planner" | "route-planner" | "planner" => Ok(AgentId::Planner),
            other => Err(format!("unknown agent '{}'", other)),
        }
    }
}

/// Coarse classification of what the user wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Alerts,
    StopInfo,
    TripPlanning,
    #[default]
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Alerts => "alerts",
            Intent::StopInfo => "stop_info",
            Intent::TripPlanning => "trip_planning",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alerts" => Ok(Intent::Alerts),
            "stop_info" | "stop-info" | "stops" => Ok(Intent::StopInfo),
            "trip_planning" | "trip-planning" => Ok(Intent::TripPlanning),
            "general" => Ok(Intent::General),
            other => Err(format!("unknown intent '{}'", other)),
        }
    }
}

/// Which router strategy produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Llm,
    Keyword,
    /// Classification failed and the fixed `general` decision was used
    Fallback,
}

/// Output of the intent router for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub confidence: f64,
    /// Ordered agent sequence; may contain duplicates
    pub agents: Vec<AgentId>,
    /// Advisory only, never used for control flow
    #[serde(default)]
    pub reasoning: String,
    pub source: DecisionSource,
}

impl RoutingDecision {
    /// Decision used when classification cannot produce anything usable
    pub fn general_fallback(reason: impl Into<String>) -> Self {
        Self {
            intent: Intent::General,
            confidence: 0.5,
            agents: Vec::new(),
            reasoning: reason.into(),
            source: DecisionSource::Fallback,
        }
    }
}

/// Map topic flags onto the closed set of allowed agent sequences:
/// `[alerts]`, `[stops]`, `[planner]`, `[alerts, planner]`,
/// `[stops, planner]`, `[alerts, stops, planner]`.
pub fn agent_sequence(alerts: bool, stops: bool, planner: bool) -> Vec<AgentId> {
    if planner {
        let mut seq = Vec::with_capacity(3);
        if alerts {
            seq.push(AgentId::Alerts);
        }
        if stops {
            seq.push(AgentId::Stops);
        }
        seq.push(AgentId::Planner);
        seq
    } else if alerts {
        vec![AgentId::Alerts]
    } else if stops {
        vec![AgentId::Stops]
    } else {
        Vec::new()
    }
}

/// Outcome status of one agent call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failed,
}

/// Per-agent outcome, scoped to one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentId,
    pub status: AgentStatus,
    /// Normalized response text, if the agent produced one
    pub text: Option<String>,
    /// Structured payload, opaque to the orchestrator
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    pub fn success(agent: AgentId, text: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            agent,
            status: AgentStatus::Success,
            text,
            payload,
            error: None,
        }
    }

    pub fn failure(agent: AgentId, error: impl Into<String>) -> Self {
        Self {
            agent,
            status: AgentStatus::Failed,
            text: None,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}
