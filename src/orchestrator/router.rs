//! Intent routing
//!
//! Turns a user message into a `RoutingDecision`. Two strategies share one
//! trait: keyword rules, and an LLM with a JSON output contract that falls
//! back to the rules (or a fixed `general` decision) when it misbehaves.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FailurePolicy;
use crate::error::ClassifyError;
use crate::llm::ChatCompletion;
use crate::types::{agent_sequence, AgentId, DecisionSource, Intent, RoutingDecision};

/// Produces a routing decision for a message. Never fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentRouter: Send + Sync {
    async fn classify(&self, message: &str) -> RoutingDecision;
}

// ============ Keyword rules ============

const ALERT_WORDS: &[&str] = &["alert", "delay", "issue", "problem", "disruption"];
const PLANNING_WORDS: &[&str] = &["how do i get", "route", "directions", "travel", "trip", "get to"];
const STOP_WORDS: &[&str] = &["stop", "station", "find", "near"];

fn mentions(message: &str, words: &[&str]) -> bool {
    words.iter().any(|w| message.contains(w))
}

/// Rule-based router
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of `classify`
    pub fn decide(&self, message: &str) -> RoutingDecision {
        let message = message.to_lowercase();
        let alerts = mentions(&message, ALERT_WORDS);
        let planning = mentions(&message, PLANNING_WORDS);
        let stops = mentions(&message, STOP_WORDS);

        let (intent, confidence) = if alerts {
            (Intent::Alerts, 0.9)
        } else if planning {
            (Intent::TripPlanning, 0.9)
        } else if stops {
            (Intent::StopInfo, 0.85)
        } else {
            (Intent::General, 0.6)
        };

        let agents = agent_sequence(alerts, stops, planning);
        let reasoning = format!(
            "keyword rules matched alerts={} stops={} planning={}",
            alerts, stops, planning
        );

        RoutingDecision {
            intent,
            confidence,
            agents,
            reasoning,
            source: DecisionSource::Keyword,
        }
    }
}

#[async_trait]
impl IntentRouter for KeywordRouter {
    async fn classify(&self, message: &str) -> RoutingDecision {
        self.decide(message)
    }
}

// ============ LLM ============

const SYSTEM_PROMPT: &str = "You are a routing analyzer. Return ONLY valid JSON, no other text.";

fn build_prompt(query: &str) -> String {
    format!(
        r#"Analyze this MBTA transit query and determine intent and required agents.

Query: "{query}"

Available agents:
- mbta-alerts: Service alerts, delays, disruptions
- mbta-stops: Find stations, stop information
- mbta-route-planner: Trip planning, route suggestions

Determine:
1. PRIMARY INTENT: alerts, stop_info, trip_planning, or general
2. CONFIDENCE: 0.0-1.0
3. AGENTS NEEDED (ordered), one of:
   ["mbta-alerts"], ["mbta-stops"], ["mbta-route-planner"],
   ["mbta-alerts", "mbta-route-planner"], ["mbta-stops", "mbta-route-planner"],
   ["mbta-alerts", "mbta-stops", "mbta-route-planner"]
   or [] for greetings and off-topic messages.

Rules:
- Only delays/alerts -> ["mbta-alerts"]
- Only stops/stations -> ["mbta-stops"]
- Only routing -> ["mbta-route-planner"]
- Delays + routing -> ["mbta-alerts", "mbta-route-planner"]
- Stops + routing -> ["mbta-stops", "mbta-route-planner"]
- Delays + stops + routing -> ["mbta-alerts", "mbta-stops", "mbta-route-planner"]

Return JSON only:
{{"intent": "alerts", "confidence": 0.9, "agents_needed": ["mbta-alerts"], "reasoning": "explanation"}}"#
    )
}

/// Shape of the classifier's JSON before validation
#[derive(Debug, Deserialize)]
struct RawDecision {
    intent: Option<String>,
    confidence: Option<f64>,
    agents_needed: Option<Vec<String>>,
    #[serde(default)]
    reasoning: Option<Value>,
}

/// Reasoning is informational, so any JSON shape is accepted
fn reasoning_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    }
}

/// Validate classifier output into a typed decision
pub fn parse_decision(text: &str) -> Result<RoutingDecision, ClassifyError> {
    let raw: RawDecision = serde_json::from_str(text.trim())
        .map_err(|e| ClassifyError::MalformedOutput(e.to_string()))?;

    let intent = raw.intent.ok_or(ClassifyError::MissingField("intent"))?;
    let intent: Intent = intent
        .parse()
        .map_err(|_| ClassifyError::UnknownIntent(intent))?;

    let names = raw.agents_needed.ok_or(ClassifyError::MissingField("agents_needed"))?;
    if names.len() > 3 {
        return Err(ClassifyError::TooManyAgents(names.len()));
    }
    let agents = names
        .into_iter()
        .map(|name| name.parse::<AgentId>().map_err(|_| ClassifyError::UnknownAgent(name)))
        .collect::<Result<Vec<_>, _>>()?;

    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.5);

    Ok(RoutingDecision {
        intent,
        confidence,
        agents,
        reasoning: reasoning_text(raw.reasoning),
        source: DecisionSource::Llm,
    })
}

/// LLM-backed router
pub struct LlmRouter {
    backend: Arc<dyn ChatCompletion>,
    timeout: Duration,
    on_failure: FailurePolicy,
    keywords: KeywordRouter,
}

impl LlmRouter {
    pub fn new(backend: Arc<dyn ChatCompletion>, timeout: Duration, on_failure: FailurePolicy) -> Self {
        Self {
            backend,
            timeout,
            on_failure,
            keywords: KeywordRouter::new(),
        }
    }

    async fn try_classify(&self, message: &str) -> Result<RoutingDecision, ClassifyError> {
        let prompt = build_prompt(message);
        let text = tokio::time::timeout(self.timeout, self.backend.complete_json(SYSTEM_PROMPT, &prompt))
            .await
            .map_err(|_| ClassifyError::Timeout(self.timeout.as_secs()))??;

        debug!("Classifier raw output: {}", crate::truncate_safe(&text, 500));
        parse_decision(&text)
    }

    fn degrade(&self, message: &str, error: &ClassifyError) -> RoutingDecision {
        match self.on_failure {
            FailurePolicy::Keyword => {
                let mut decision = self.keywords.decide(message);
                decision.reasoning = format!("LLM classification failed ({}); {}", error, decision.reasoning);
                decision
            }
            FailurePolicy::General => {
                RoutingDecision::general_fallback(format!("LLM classification failed: {}", error))
            }
        }
    }
}

#[async_trait]
impl IntentRouter for LlmRouter {
    async fn classify(&self, message: &str) -> RoutingDecision {
        match self.try_classify(message).await {
            Ok(decision) => {
                info!(
                    "LLM classification: intent={} confidence={:.2} agents={:?}",
                    decision.intent, decision.confidence, decision.agents
                );
                debug!("Reasoning: {}", decision.reasoning);
                decision
            }
            Err(e) => {
                warn!("LLM classification failed: {}", e);
                self.degrade(message, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatCompletion;
    use AgentId::*;

    #[test]
    fn test_keyword_alerts() {
        let d = KeywordRouter.decide("Red Line delays?");
        assert_eq!(d.intent, Intent::Alerts);
        assert_eq!(d.agents, vec![Alerts]);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.source, DecisionSource::Keyword);
    }

    #[test]
    fn test_keyword_stops() {
        let d = KeywordRouter.decide("Find stops near Harvard");
        assert_eq!(d.intent, Intent::StopInfo);
        assert_eq!(d.agents, vec![Stops]);
        assert_eq!(d.confidence, 0.85);
    }

    #[test]
    fn test_keyword_planning_chains() {
        let d = KeywordRouter.decide("How do I get from Park Street to MIT?");
        assert_eq!(d.intent, Intent::TripPlanning);
        assert_eq!(d.agents, vec![Planner]);

        let d = KeywordRouter.decide("Best route to Harvard considering delays");
        assert_eq!(d.intent, Intent::Alerts);
        assert_eq!(d.agents, vec![Alerts, Planner]);

        let d = KeywordRouter.decide("Check delays, find nearby stops, plan route to Harvard");
        assert_eq!(d.agents, vec![Alerts, Stops, Planner]);
    }

    #[test]
    fn test_keyword_general() {
        let d = KeywordRouter.decide("hello there");
        assert_eq!(d.intent, Intent::General);
        assert!(d.agents.is_empty());
    }

    #[test]
    fn test_parse_valid_decision() {
        let d = parse_decision(
            r#"{"intent":"trip_planning","confidence":0.82,"agents_needed":["mbta-stops","mbta-route-planner"],"reasoning":"stops then route"}"#,
        )
        .unwrap();
        assert_eq!(d.intent, Intent::TripPlanning);
        assert_eq!(d.agents, vec![Stops, Planner]);
        assert_eq!(d.reasoning, "stops then route");
        assert_eq!(d.source, DecisionSource::Llm);
    }

    #[test]
    fn test_parse_accepts_non_string_reasoning() {
        let d = parse_decision(r#"{"intent":"alerts","confidence":0.9,"agents_needed":["mbta-alerts"],"reasoning":42}"#).unwrap();
        assert_eq!(d.agents, vec![Alerts]);
        assert_eq!(d.reasoning, "42");

        let d = parse_decision(
            r#"{"intent":"stop_info","agents_needed":["mbta-stops"],"reasoning":{"why":"station lookup"}}"#,
        )
        .unwrap();
        assert_eq!(d.intent, Intent::StopInfo);
        assert_eq!(d.reasoning, r#"{"why":"station lookup"}"#);

        let d = parse_decision(r#"{"intent":"general","agents_needed":[],"reasoning":null}"#).unwrap();
        assert_eq!(d.reasoning, "");
    }

    #[test]
    fn test_parse_keeps_duplicates() {
        let d = parse_decision(r#"{"intent":"alerts","agents_needed":["mbta-alerts","mbta-alerts"]}"#).unwrap();
        assert_eq!(d.agents, vec![Alerts, Alerts]);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_parse_clamps_confidence() {
        let d = parse_decision(r#"{"intent":"general","confidence":7,"agents_needed":[]}"#).unwrap();
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(parse_decision("not json"), Err(ClassifyError::MalformedOutput(_))));
        assert!(matches!(
            parse_decision(r#"{"agents_needed":[]}"#),
            Err(ClassifyError::MissingField("intent"))
        ));
        assert!(matches!(
            parse_decision(r#"{"intent":"alerts"}"#),
            Err(ClassifyError::MissingField("agents_needed"))
        ));
        assert!(matches!(
            parse_decision(r#"{"intent":"weather","agents_needed":[]}"#),
            Err(ClassifyError::UnknownIntent(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"intent":"alerts","agents_needed":["mbta-fares"]}"#),
            Err(ClassifyError::UnknownAgent(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"intent":"alerts","agents_needed":["alerts","stops","planner","alerts"]}"#),
            Err(ClassifyError::TooManyAgents(4))
        ));
    }

    #[tokio::test]
    async fn test_llm_router_uses_backend() {
        let mut backend = MockChatCompletion::new();
        backend.expect_complete_json().times(1).returning(|_, _| {
            Ok(r#"{"intent":"alerts","confidence":0.95,"agents_needed":["mbta-alerts"],"reasoning":"delays"}"#.to_string())
        });

        let router = LlmRouter::new(Arc::new(backend), Duration::from_secs(5), FailurePolicy::General);
        let d = router.classify("Red Line delays?").await;
        assert_eq!(d.intent, Intent::Alerts);
        assert_eq!(d.agents, vec![Alerts]);
        assert_eq!(d.source, DecisionSource::Llm);
    }

    #[tokio::test]
    async fn test_llm_router_general_fallback_on_error() {
        let mut backend = MockChatCompletion::new();
        backend
            .expect_complete_json()
            .returning(|_, _| Err(anyhow::anyhow!("LLM API error (500)")));

        let router = LlmRouter::new(Arc::new(backend), Duration::from_secs(5), FailurePolicy::General);
        let d = router.classify("Red Line delays?").await;
        assert_eq!(d.intent, Intent::General);
        assert!(d.confidence <= 0.5);
        assert!(d.agents.is_empty());
        assert_eq!(d.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_llm_router_keyword_fallback_on_malformed_output() {
        let mut backend = MockChatCompletion::new();
        backend
            .expect_complete_json()
            .returning(|_, _| Ok(r#"{"intent": "alerts""#.to_string()));

        let router = LlmRouter::new(Arc::new(backend), Duration::from_secs(5), FailurePolicy::Keyword);
        let d = router.classify("Find stops near Fenway").await;
        assert_eq!(d.intent, Intent::StopInfo);
        assert_eq!(d.agents, vec![Stops]);
        assert_eq!(d.source, DecisionSource::Keyword);
        assert!(d.reasoning.contains("LLM classification failed"));
    }

    struct StalledBackend;

    #[async_trait]
    impl ChatCompletion for StalledBackend {
        async fn complete_json(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_llm_router_times_out() {
        let router = LlmRouter::new(Arc::new(StalledBackend), Duration::from_millis(50), FailurePolicy::General);
        let d = router.classify("anything").await;
        assert_eq!(d.source, DecisionSource::Fallback);
    }

    #[test]
    fn test_prompt_contains_query() {
        let prompt = build_prompt("Red Line delays?");
        assert!(prompt.contains("Query: \"Red Line delays?\""));
        assert!(prompt.contains("mbta-route-planner"));
    }
}
