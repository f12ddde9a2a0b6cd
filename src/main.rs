//! Transit Orchestrator
//!
//! Routes transit questions to alerts, stops and trip-planning agents.

use transit_orchestrator::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
