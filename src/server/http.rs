//! HTTP handlers

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::orchestrator::RouterKind;
use crate::server::ServerState;

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub router: RouterKind,
    pub registry_url: String,
    pub cache_ttl_secs: u64,
}

/// Status handler
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let response = StatusResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        router: state.orchestrator.router_kind(),
        registry_url: state.config.registry.url.clone(),
        cache_ttl_secs: state.config.registry.cache_ttl_secs,
    };

    (StatusCode::OK, Json(response)).into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// Chat handler: one orchestrated turn
pub async fn chat_handler(
    State(state): State<ServerState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let message = req.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "message must not be empty"})),
        )
            .into_response();
    }

    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = state.orchestrator.process(message, &conversation_id).await;
    (StatusCode::OK, Json(outcome)).into_response()
}
