//! agent-hub: Agent Hub Main Binary
//!
//! Main entry point for the agent hub.
//!
//! Usage:
//!   agent-hub                    - Start the hub (HTTP API + sub-agents)
//!   agent-hub --config <path>    - Start with an explicit config file
//!   agent-hub --help             - Show help

use hub_core::memory::open_store;
use hub_core::{AgentRegistry, Config, EventBus, LearningEngine, Orchestrator, OrchestratorSettings, TieredMemory};
use hub_core::ids::default_generator;
use hub_core::learning::LearningSnapshot;
use hub_mcp::McpConnector;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often expired short-term entries are swept from the index
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Run mode
enum RunMode {
    /// Start the hub, optionally from an explicit config file
    Server { config_path: Option<String> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let mode = parse_args(std::env::args().skip(1))?;

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("agent-hub {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { config_path } => config_path,
    };

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match &config_path {
        Some(path) => Config::from_toml_file(path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    // Initialize logging; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.logging.level))?,
        )
        .init();

    tracing::info!("Starting agent-hub...");
    run_server(config).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config_path = Some(path);
            }
            other => return Err(anyhow::anyhow!("Unknown argument: {}", other)),
        }
    }

    Ok(RunMode::Server { config_path })
}

/// Print help message
fn print_help() {
    println!("agent-hub - Sub-agent orchestration hub");
    println!();
    println!("Usage:");
    println!("  agent-hub                  Start the hub");
    println!("  agent-hub --config <path>  Load configuration from <path>");
    println!("  agent-hub --help           Show this help message");
    println!("  agent-hub --version        Show version");
    println!();
    println!("Configuration is read from ./agent-hub.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  HUB_HOST                 Listen host (default: 0.0.0.0)");
    println!("  HUB_PORT                 Listen port (default: 3000)");
    println!("  STORE_URL                memory:// or sqlite://<path> (default: sqlite://data/agent-hub.db)");
    println!("  LOG_LEVEL                Log level (default: info)");
    println!("  TOKEN_TRACKING_ENABLED   Report token usage (default: true)");
    println!("  AGENT_TIMEOUT_MS         Per-agent time budget (default: 30000)");
    println!("  MAX_CONCURRENT_AGENTS    Advisory agent limit (default: 10)");
    println!("  SHORT_TERM_TTL_SECS      Short-term memory TTL (default: 3600)");
    println!("  LEARNING_SNAPSHOT_PATH   Learning snapshot file (optional)");
}

/// Wire the components and serve until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config.store.url).map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let events = EventBus::with_default_capacity();
    let memory = Arc::new(TieredMemory::new(
        store,
        config.memory.short_term_ttl(),
        default_generator(),
    ));
    let learning = Arc::new(
        LearningEngine::new(events.clone())
            .with_memory(memory.clone())
            .with_min_pattern_confidence(config.learning.min_pattern_confidence),
    );

    if let Some(path) = &config.learning.snapshot_path {
        if Path::new(path).exists() {
            match LearningSnapshot::read_from(path) {
                Ok(snapshot) => {
                    tracing::info!(path = %path, patterns = snapshot.patterns.len(), "Imported learning snapshot");
                    learning.import(snapshot);
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "Failed to import learning snapshot"),
            }
        }
    }

    let registry = Arc::new(
        AgentRegistry::new(Arc::new(McpConnector::new()), events)
            .with_max_concurrent(config.agents.max_concurrent),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        memory.clone(),
        learning.clone(),
        OrchestratorSettings::from(&config),
    ));

    let registered = orchestrator.initialize(config.agents.definitions.clone()).await;
    tracing::info!(
        registered,
        configured = config.agents.definitions.len(),
        "Sub-agents registered"
    );

    // Sweep expired short-term entries in the background
    let purge_memory = memory.clone();
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_memory.short_term().purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired short-term memories"),
                Err(e) => tracing::warn!(error = %e, "Short-term purge failed"),
            }
        }
    });

    // Start HTTP API server
    let addr = config.server.addr();
    let state = hub_api::AppState::new(orchestrator.clone());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    };

    tracing::info!("agent-hub initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    let served = hub_api::start_server(&addr, state, shutdown).await;

    purge_handle.abort();
    orchestrator.shutdown().await;

    if let Some(path) = &config.learning.snapshot_path {
        match learning.export().write_to(path) {
            Ok(()) => tracing::info!(path = %path, "Exported learning snapshot"),
            Err(e) => tracing::error!(path = %path, error = %e, "Failed to export learning snapshot"),
        }
    }

    served?;
    tracing::info!("agent-hub stopped");
    Ok(())
}
