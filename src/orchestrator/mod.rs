//! Multi-agent transit orchestration
//!
//! Leaf-first: `directory` resolves agents, `invoker` calls them, `router`
//! classifies messages, `graph` drives a turn, `synthesizer` merges replies.

pub mod directory;
pub mod invoker;
pub mod router;
pub mod synthesizer;
pub mod graph;
pub mod orchestrator;

// Re-export commonly used types
pub use directory::{AgentDescriptor, AgentDirectory, DescriptorSource};
pub use invoker::{A2aInvoker, AgentInvoker};
pub use router::{IntentRouter, KeywordRouter, LlmRouter};
pub use graph::{ConversationTurn, StateMachine};
pub use orchestrator::{Orchestrator, RouterKind, TurnOutcome};
