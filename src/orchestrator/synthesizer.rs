//! Response synthesis
//!
//! Merges agent replies into the final text, or picks a canned reply for
//! `general` turns. Never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::types::{AgentId, AgentResult, Intent};

pub const GREETING: &str = "Hello! I'm your Boston transit assistant. I can check service alerts, \
find nearby stops and stations, and plan trips on the MBTA. What would you like to know?";

pub const CAPABILITIES: &str = "I can help you with:\n\
- Service alerts: delays, disruptions and planned work\n\
- Stops and stations: find stops near a place or look up a station\n\
- Trip planning: routes between two places on the MBTA\n\
Try asking \"Are there Red Line delays?\" or \"How do I get to Harvard?\"";

pub const APOLOGY: &str =
    "I received your request but couldn't generate a complete response. Please try rephrasing.";

static GREETING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(hi|hello|hey)\b").expect("valid greeting regex"));

/// Stops replies containing this are apologies, not answers
const NEGATIVE_MARKER: &str = "couldn't";

#[derive(Debug, Default, Clone, Copy)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(
        &self,
        intent: Intent,
        message: &str,
        results: &BTreeMap<AgentId, AgentResult>,
    ) -> String {
        if intent == Intent::General {
            return if GREETING_RE.is_match(message) {
                GREETING.to_string()
            } else {
                CAPABILITIES.to_string()
            };
        }

        // BTreeMap iterates in AgentId order: alerts, stops, planner
        let parts: Vec<&str> = results
            .values()
            .filter_map(usable_text)
            .collect();

        if parts.is_empty() {
            APOLOGY.to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

fn usable_text(result: &AgentResult) -> Option<&str> {
    let text = result.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    if result.agent == AgentId::Stops && text.to_lowercase().contains(NEGATIVE_MARKER) {
        return None;
    }
    Some(text)
}
