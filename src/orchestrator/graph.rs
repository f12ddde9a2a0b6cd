//! Orchestration state machine
//!
//! One turn walks `Classify -> agents... -> Synthesize -> End` in a single
//! pass. Edges are an explicit table keyed by `AgentId`; the routing
//! decision's agent sequence picks which of the reachable edges to take.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::invoker::AgentInvoker;
use super::router::IntentRouter;
use super::synthesizer::Synthesizer;
use crate::types::{AgentId, AgentResult, DecisionSource, Intent, RoutingDecision};

/// Appended to the planner's message when a stops result is in hand
pub const STOP_CONTEXT_HINT: &str = "\n[Context: Stop data available]";

/// A state in the turn graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Classify,
    Agent(AgentId),
    Synthesize,
    End,
}

impl Node {
    /// Agent states with an edge out of this node
    pub fn reachable_agents(&self) -> &'static [AgentId] {
        match self {
            Node::Classify => &[AgentId::Alerts, AgentId::Stops, AgentId::Planner],
            Node::Agent(AgentId::Alerts) => &[AgentId::Stops, AgentId::Planner],
            Node::Agent(AgentId::Stops) => &[AgentId::Planner],
            Node::Agent(AgentId::Planner) | Node::Synthesize | Node::End => &[],
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Classify => f.write_str("classify"),
            Node::Agent(agent) => f.write_str(agent.label()),
            Node::Synthesize => f.write_str("synthesize"),
            Node::End => f.write_str("end"),
        }
    }
}

/// Single-step routing used when the decision carries no agent sequence
fn intent_entry(intent: Intent) -> Node {
    match intent {
        Intent::Alerts => Node::Agent(AgentId::Alerts),
        Intent::StopInfo => Node::Agent(AgentId::Stops),
        Intent::TripPlanning => Node::Agent(AgentId::Planner),
        Intent::General => Node::Synthesize,
    }
}

/// Pick the state after `current`
pub fn next_node(current: Node, turn: &ConversationTurn) -> Node {
    match current {
        Node::Synthesize | Node::End => Node::End,
        Node::Classify if turn.selected.is_empty() => intent_entry(turn.intent),
        Node::Classify | Node::Agent(_) => {
            let reachable = current.reachable_agents();
            turn.selected
                .iter()
                .copied()
                .find(|agent| !turn.invoked.contains(agent) && reachable.contains(agent))
                .map(Node::Agent)
                .unwrap_or(Node::Synthesize)
        }
    }
}

/// One user message being processed
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub message: String,
    pub conversation_id: String,
    pub intent: Intent,
    pub confidence: f64,
    /// Agent sequence chosen by the router
    pub selected: Vec<AgentId>,
    /// Agents actually called, in call order
    pub invoked: Vec<AgentId>,
    pub results: BTreeMap<AgentId, AgentResult>,
    pub final_response: String,
    pub terminal: bool,
    pub reasoning: String,
    pub decision_source: DecisionSource,
    /// States visited, in order
    pub path: Vec<Node>,
}

impl ConversationTurn {
    pub fn new(message: &str, conversation_id: &str) -> Self {
        Self {
            message: message.to_string(),
            conversation_id: conversation_id.to_string(),
            intent: Intent::General,
            confidence: 0.0,
            selected: Vec::new(),
            invoked: Vec::new(),
            results: BTreeMap::new(),
            final_response: String::new(),
            terminal: false,
            reasoning: String::new(),
            decision_source: DecisionSource::Fallback,
            path: Vec::new(),
        }
    }

    fn apply(&mut self, decision: RoutingDecision) {
        self.intent = decision.intent;
        self.confidence = decision.confidence;
        self.selected = decision.agents;
        self.reasoning = decision.reasoning;
        self.decision_source = decision.source;
    }

    /// Message sent to `agent`, with the stop-data hint for the planner
    fn message_for(&self, agent: AgentId) -> String {
        let has_stops = self
            .results
            .get(&AgentId::Stops)
            .map(AgentResult::is_success)
            .unwrap_or(false);
        if agent == AgentId::Planner && has_stops {
            format!("{}{}", self.message, STOP_CONTEXT_HINT)
        } else {
            self.message.clone()
        }
    }
}

/// Drives one turn through the graph
pub struct StateMachine {
    router: Arc<dyn IntentRouter>,
    invoker: Arc<dyn AgentInvoker>,
    synthesizer: Synthesizer,
}

impl StateMachine {
    pub fn new(router: Arc<dyn IntentRouter>, invoker: Arc<dyn AgentInvoker>) -> Self {
        Self {
            router,
            invoker,
            synthesizer: Synthesizer::new(),
        }
    }

    /// Run a turn to completion. Degraded sub-steps are recorded, not raised.
    pub async fn run(&self, message: &str, conversation_id: &str) -> ConversationTurn {
        let mut turn = ConversationTurn::new(message, conversation_id);
        let mut node = Node::Classify;

        loop {
            turn.path.push(node);
            debug!("[{}] entering {}", conversation_id, node);

            match node {
                Node::Classify => {
                    let decision = self
                        .router
                        .classify(message)
                        .instrument(info_span!("classify", conversation_id))
                        .await;
                    info!(
                        "[{}] intent={} confidence={:.2} agents={:?} ({:?})",
                        conversation_id, decision.intent, decision.confidence, decision.agents, decision.source
                    );
                    turn.apply(decision);
                }
                Node::Agent(agent) => self.enter_agent(&mut turn, agent).await,
                Node::Synthesize => {
                    let _span = info_span!("synthesize", conversation_id).entered();
                    turn.final_response =
                        self.synthesizer.synthesize(turn.intent, &turn.message, &turn.results);
                }
                Node::End => {
                    turn.terminal = true;
                    break;
                }
            }

            node = next_node(node, &turn);
        }

        info!(
            "[{}] turn complete: path={}",
            conversation_id,
            turn.path.iter().map(Node::to_string).collect::<Vec<_>>().join(" -> ")
        );
        turn
    }

    async fn enter_agent(&self, turn: &mut ConversationTurn, agent: AgentId) {
        let message = turn.message_for(agent);
        let span = info_span!("agent", agent = %agent, conversation_id = %turn.conversation_id);
        let reply = self
            .invoker
            .invoke(agent, &message, &turn.conversation_id)
            .instrument(span)
            .await;
        let result = match reply {
            Ok(result) => {
                debug!("{} replied ({} chars)", agent, result.text.as_deref().map(str::len).unwrap_or(0));
                result
            }
            Err(e) => {
                warn!("{} failed: {}", agent, e);
                AgentResult::failure(agent, e.to_string())
            }
        };
        turn.invoked.push(agent);
        turn.results.insert(agent, result);
    }
}
