//! CLI interface for transit-orchestrator

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::orchestrator::directory::AgentDirectory;
use crate::orchestrator::orchestrator::build_router;
use crate::orchestrator::{IntentRouter, Orchestrator};
use crate::types::AgentId;

#[derive(Parser)]
#[command(name = "transit-orchestrator")]
#[command(about = "Routes transit questions to alerts, stops and trip-planning agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "TRANSIT_CONFIG")]
    config: Option<PathBuf>,

    /// Log at info level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one orchestrated turn and print the answer
    Ask {
        /// The question
        message: String,
        /// Conversation id (default: random UUID)
        #[arg(short = 'C', long)]
        conversation_id: Option<String>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a message would be routed, without calling agents
    Classify {
        /// The message to classify
        message: String,
        /// Force the keyword rules
        #[arg(long)]
        keyword: bool,
    },
    /// Resolve an agent's address through the registry (or fallback)
    Resolve {
        /// Agent name: alerts, stops, planner or the full mbta-* name
        agent: String,
    },
    /// Start the web server
    Serve {
        /// Port to listen on (default: from config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: from config)
        #[arg(long)]
        host: Option<String>,
    },
    /// Show or initialise the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::INFO } else { tracing::Level::WARN };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => config::config_path(),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = resolve_config_path(cli.config)?;
    let config = Config::load_from(&config_path)?;

    match cli.command {
        Commands::Ask { message, conversation_id, json } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let conversation_id = conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let outcome = orchestrator.process(&message, &conversation_id).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.response);
                println!();
                println!(
                    "intent: {} ({:.2})  agents: {}",
                    outcome.intent,
                    outcome.confidence,
                    outcome
                        .agents_called
                        .iter()
                        .map(AgentId::name)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        Commands::Classify { message, keyword } => {
            let mut config = config;
            if keyword {
                config.classifier.backend = config::ClassifierBackend::Keyword;
            }
            let (router, kind) = build_router(&config)?;
            let decision = router.classify(&message).await;
            println!("router: {:?}", kind);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Resolve { agent } => {
            let agent: AgentId = agent
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Expected alerts, stops or planner")?;
            let directory = AgentDirectory::from_config(&config.registry, &config.agents.fallback)?;
            let descriptor = directory.resolve(agent).await;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }
        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(config, &host, port).await?;
        }
        Commands::Config { show, init, path } => {
            if path {
                println!("{}", config_path.display());
            } else if init {
                if config_path.exists() {
                    println!("Config already exists at {}", config_path.display());
                } else {
                    Config::default().save_to(&config_path)?;
                    println!("Wrote default config to {}", config_path.display());
                }
            } else if show {
                // api_key is never serialized
                println!("{}", toml::to_string_pretty(&config)?);
                println!(
                    "# classifier api key: {}",
                    if config.classifier.api_key.is_some() { "set (OPENAI_API_KEY)" } else { "not set" }
                );
            } else {
                println!("{}", config::default_config_toml());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["transit-orchestrator", "ask", "Red Line delays?", "--json"]).unwrap();
        match cli.command {
            Commands::Ask { message, json, conversation_id } => {
                assert_eq!(message, "Red Line delays?");
                assert!(json);
                assert!(conversation_id.is_none());
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["transit-orchestrator", "serve", "--port", "9000", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000), host: None }));
    }
}
