//! Transit Orchestrator - multi-agent routing for a transit assistant
//!
//! A user message is classified into an intent and an ordered list of
//! backend agents (alerts, stops, trip planning). The agents are called
//! over the A2A request/reply protocol and their replies merged into one
//! answer.
//!
//! # Example
//!
//! ```ignore
//! use transit_orchestrator::config::config_path;
//! use transit_orchestrator::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_from(&config_path()?)?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!     let outcome = orchestrator.process("Red Line delays?", "conv-1").await;
//!     println!("{}", outcome.response);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod server;
pub mod cli;

pub use config::Config;
pub use error::{ClassifyError, DiscoveryError, InvokeError};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use server::{start as start_server, ServerState};
pub use types::{AgentId, AgentResult, Intent, RoutingDecision};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Truncate to at most `max` bytes without splitting a UTF-8 character
pub fn truncate_safe(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("hello", 3), "hel");
        // 'é' is two bytes; never split it
        assert_eq!(truncate_safe("café", 4), "caf");
    }
}
