//! Web server exposing the orchestrator over HTTP

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(http::chat_handler))
        .route("/api/status", get(http::status_handler))
        .route("/health", get(http::health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(config: Config, host: &str, port: u16) -> Result<()> {
    let orchestrator = Orchestrator::from_config(&config)?;
    let router_kind = orchestrator.router_kind();
    let registry = config.registry.url.clone();
    let state = ServerState::new(config, orchestrator);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Transit Orchestrator Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Router: {:?}", router_kind);
    println!("✓ Registry: {}", registry);
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    info!("{} v{} binding {}", crate::NAME, crate::VERSION, addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
