//! ChatRelay - real-time presence and message relay server

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::{
    config::ConfigManager,
    management::ManagementServer,
    metrics::Metrics,
    shutdown::ShutdownAwareTask,
    ConnectionManager, ShutdownCoordinator,
};

/// CLI arguments for ChatRelay
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "Real-time presence tracking and message relay")]
#[command(version)]
#[command(long_about = "
Real-time presence tracking and message relay.

Clients connect over WebSocket, identify with a user id and exchange
messages addressed by recipient id. Messages to offline users are dropped.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  CHATRELAY_BIND_ADDR           - Bind address (e.g., 0.0.0.0:5000)
  PORT                          - Port only, keeps the bind host
  CHATRELAY_MAX_CONNECTIONS     - Maximum concurrent connections
  CHATRELAY_SEND_QUEUE_SIZE     - Per-connection outbound queue length
  CHATRELAY_HEARTBEAT_INTERVAL  - Heartbeat ping interval (e.g., 30s)
  CHATRELAY_UNIDENTIFIED_SENDER - reject or pass_through
  CHATRELAY_LOG_LEVEL           - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:5000)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Maximum number of concurrent connections
    #[arg(long, help = "Maximum number of concurrent connections")]
    pub max_connections: Option<usize>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // CLI args > config file > environment > defaults
    let config_from_file = args.config.exists();
    let mut config = if config_from_file {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.max_connections,
        args.log_level.as_deref(),
    )?;

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config.monitoring.log_level)?;

    info!("Starting ChatRelay v{}", env!("CARGO_PKG_VERSION"));
    if config_from_file {
        info!("Configuration loaded from {}", args.config.display());
    } else {
        info!("Config file {} not found, using environment and defaults", args.config.display());
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  WebSocket path: {}", config.server.ws_path);
        info!("  Max connections: {}", config.server.max_connections);
        info!("  Heartbeat: {:?} (timeout {:?})",
              config.server.heartbeat_interval, config.server.client_timeout);
        info!("  Unidentified senders: {:?}", config.relay.unidentified_sender);
        info!("  Allowed origins: {}", config.cors.allowed_origins.join(", "));
        info!(
            "  Management API: {}",
            if config.monitoring.management_api.enabled {
                config.monitoring.management_api.bind_addr.to_string()
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    info!("Bind address: {}", config.server.bind_addr);
    info!("Max connections: {}", config.server.max_connections);

    let shutdown_coordinator = ShutdownCoordinator::new();
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());
    let connection_manager = Arc::new(ConnectionManager::new(Arc::clone(&config), Arc::clone(&metrics)));

    let management_task = if config.monitoring.management_api.enabled {
        let management_server = ManagementServer::new(
            Arc::clone(&config),
            Arc::clone(&metrics),
            Arc::clone(&connection_manager),
        );

        Some(ShutdownAwareTask::spawn(&shutdown_coordinator, "management-api", |mut shutdown_rx| async move {
            tokio::select! {
                result = management_server.start() => {
                    if let Err(e) = result {
                        error!("Management API server error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {}
            }
        }))
    } else {
        info!("Management API server disabled");
        None
    };

    let mut server_handle = tokio::spawn(Arc::clone(&connection_manager).start());

    info!("ChatRelay started, press Ctrl+C or send SIGTERM to shut down");

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => warn!("Relay server stopped unexpectedly"),
                Ok(Err(e)) => error!("Relay server error: {:#}", e),
                Err(e) => error!("Relay server task failed: {}", e),
            }
        }
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
            }
        }
    }

    info!("Initiating graceful shutdown...");
    if let Err(e) = shutdown_coordinator.shutdown_connection_manager(&connection_manager).await {
        error!("Error during connection cleanup: {}", e);
    }

    if !server_handle.is_finished() {
        if let Err(e) = server_handle.await {
            if !e.is_cancelled() {
                error!("Relay server task failed: {}", e);
            }
        }
    }

    if let Some(task) = management_task {
        if let Err(e) = task.finish(config.server.shutdown_timeout).await {
            error!("Management API task failed: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        configured_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
