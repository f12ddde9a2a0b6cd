//! A2A agent invocation
//!
//! One request/reply exchange with one agent: resolve, POST the request
//! envelope to `/a2a/message`, normalize the reply. No retries here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::directory::AgentDirectory;
use crate::config::AgentsConfig;
use crate::error::InvokeError;
use crate::types::{AgentId, AgentResult};

/// Path of the A2A message endpoint on every agent
pub const A2A_MESSAGE_PATH: &str = "/a2a/message";

/// Request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: A2aRequestPayload,
    pub metadata: A2aMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aRequestPayload {
    pub message: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aMetadata {
    pub source: String,
    pub agent: AgentId,
}

impl A2aRequest {
    pub fn new(agent: AgentId, message: &str, conversation_id: &str, source: &str) -> Self {
        Self {
            kind: "request".to_string(),
            payload: A2aRequestPayload {
                message: message.to_string(),
                conversation_id: conversation_id.to_string(),
            },
            metadata: A2aMetadata {
                source: source.to_string(),
                agent,
            },
        }
    }
}

/// Turn a parsed agent reply into an `AgentResult`.
///
/// `{"type":"response","payload":{...}}` yields `payload.text` and keeps the
/// payload; anything else passes through unchanged, with text taken from a
/// top-level `response` string if there is one.
pub fn normalize_reply(agent: AgentId, body: Value) -> AgentResult {
    if body.get("type").and_then(Value::as_str) == Some("response") {
        if let Some(payload) = body.get("payload") {
            let text = payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return AgentResult::success(agent, Some(text), payload.clone());
        }
    }

    let text = body
        .get("response")
        .and_then(Value::as_str)
        .map(str::to_string);
    AgentResult::success(agent, text, body)
}

/// Calls one agent
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: AgentId,
        message: &str,
        conversation_id: &str,
    ) -> Result<AgentResult, InvokeError>;
}

/// HTTP invoker speaking the A2A request/reply contract
pub struct A2aInvoker {
    directory: Arc<AgentDirectory>,
    client: Client,
    timeout: Duration,
    source: String,
}

impl A2aInvoker {
    pub fn new(directory: Arc<AgentDirectory>, config: &AgentsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.invoke_timeout())
            .build()
            .context("Failed to build agent HTTP client")?;
        Ok(Self {
            directory,
            client,
            timeout: config.invoke_timeout(),
            source: config.source.clone(),
        })
    }
}

#[async_trait]
impl AgentInvoker for A2aInvoker {
    async fn invoke(
        &self,
        agent: AgentId,
        message: &str,
        conversation_id: &str,
    ) -> Result<AgentResult, InvokeError> {
        let descriptor = self.directory.resolve(agent).await;
        let url = descriptor.address.endpoint(A2A_MESSAGE_PATH);
        let envelope = A2aRequest::new(agent, message, conversation_id, &self.source);

        debug!("POST {} ({:?} via {:?})", url, agent, descriptor.source);

        let response = self.client
            .post(&url)
            .timeout(self.timeout)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| InvokeError::from_transport(agent, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Status {
                agent,
                status: status.as_u16(),
                body: crate::truncate_safe(&body, 200).to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| InvokeError::MalformedReply {
                agent,
                reason: e.to_string(),
            })?;

        Ok(normalize_reply(agent, body))
    }
}
