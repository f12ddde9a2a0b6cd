//! Transit orchestrator
//!
//! Entry point for one user message: wires the configured router, the A2A
//! invoker and the state machine, and shapes the turn into a `TurnOutcome`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::directory::AgentDirectory;
use super::graph::{ConversationTurn, StateMachine};
use super::invoker::{A2aInvoker, AgentInvoker};
use super::router::{IntentRouter, KeywordRouter, LlmRouter};
use crate::config::{ClassifierBackend, Config};
use crate::llm::BoundModel;
use crate::types::{AgentId, AgentStatus, Intent, RoutingDecision};

/// Which router strategy a running orchestrator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    Llm,
    Keyword,
}

/// Execution details returned alongside the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub conversation_id: String,
    pub graph_execution: String,
    /// Decision as the router made it, including agents the edges skipped
    pub routing: RoutingDecision,
    pub discovery: String,
    /// Visited states, e.g. `["classify", "alerts", "synthesize", "end"]`
    pub path: Vec<String>,
    pub agent_status: BTreeMap<AgentId, AgentStatus>,
}

/// Result of `Orchestrator::process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub response: String,
    pub intent: Intent,
    pub confidence: f64,
    pub agents_called: Vec<AgentId>,
    pub metadata: TurnMetadata,
}

impl From<ConversationTurn> for TurnOutcome {
    fn from(turn: ConversationTurn) -> Self {
        let graph_execution = if turn.terminal { "completed" } else { "incomplete" };
        let agent_status = turn
            .results
            .iter()
            .map(|(agent, result)| (*agent, result.status))
            .collect();
        Self {
            response: turn.final_response,
            intent: turn.intent,
            confidence: turn.confidence,
            agents_called: turn.invoked,
            metadata: TurnMetadata {
                conversation_id: turn.conversation_id,
                graph_execution: graph_execution.to_string(),
                routing: RoutingDecision {
                    intent: turn.intent,
                    confidence: turn.confidence,
                    agents: turn.selected,
                    reasoning: turn.reasoning,
                    source: turn.decision_source,
                },
                discovery: "registry-with-fallback".to_string(),
                path: turn.path.iter().map(ToString::to_string).collect(),
                agent_status,
            },
        }
    }
}

pub struct Orchestrator {
    machine: StateMachine,
    router_kind: RouterKind,
}

impl Orchestrator {
    pub fn new(router: Arc<dyn IntentRouter>, invoker: Arc<dyn AgentInvoker>, router_kind: RouterKind) -> Self {
        Self {
            machine: StateMachine::new(router, invoker),
            router_kind,
        }
    }

    /// Build the production stack from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let directory = Arc::new(AgentDirectory::from_config(&config.registry, &config.agents.fallback)?);
        let invoker: Arc<dyn AgentInvoker> = Arc::new(A2aInvoker::new(directory, &config.agents)?);
        let (router, kind) = build_router(config)?;
        info!("Orchestrator ready (router: {:?}, registry: {})", kind, config.registry.url);
        Ok(Self::new(router, invoker, kind))
    }

    pub fn router_kind(&self) -> RouterKind {
        self.router_kind
    }

    /// Process one user message. Never fails; degraded steps show up in
    /// the metadata instead.
    pub async fn process(&self, message: &str, conversation_id: &str) -> TurnOutcome {
        let turn = self.machine.run(message, conversation_id).await;
        TurnOutcome::from(turn)
    }
}

/// Pick the router strategy; the LLM backend degrades to keywords without a key
pub fn build_router(config: &Config) -> Result<(Arc<dyn IntentRouter>, RouterKind)> {
    match config.classifier.backend {
        ClassifierBackend::Keyword => Ok((Arc::new(KeywordRouter::new()), RouterKind::Keyword)),
        ClassifierBackend::Llm => match BoundModel::from_config(&config.classifier)? {
            Some(model) => {
                let router = LlmRouter::new(
                    Arc::new(model),
                    config.classifier.timeout(),
                    config.classifier.on_failure,
                );
                Ok((Arc::new(router), RouterKind::Llm))
            }
            None => {
                warn!("No classifier API key configured, using keyword routing");
                Ok((Arc::new(KeywordRouter::new()), RouterKind::Keyword))
            }
        },
    }
}
