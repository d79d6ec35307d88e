//! Signal Relay - WebSocket signaling server
//!
//! Serves a page and a relay endpoint on one port. Every message a client
//! sends is broadcast to every other connected client.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use signal_relay::{config::ConfigManager, RelayServer, ShutdownCoordinator};

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

/// CLI arguments for Signal Relay
#[derive(Parser, Debug)]
#[command(name = "signal-relay")]
#[command(about = "Signal Relay - WebSocket signaling server")]
#[command(version)]
#[command(long_about = "
Signal Relay - WebSocket signaling server

Clients connect with a WebSocket to the root path. Every message one
client sends is forwarded unchanged to every other connected client.
A plain GET on the root path serves a test page.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SIGNAL_RELAY_BIND_ADDR        - Bind address (e.g., 0.0.0.0:80)
  SIGNAL_RELAY_INDEX_PAGE       - HTML file served at /
  SIGNAL_RELAY_SHUTDOWN_TIMEOUT - Graceful shutdown timeout (e.g., 10s)
  SIGNAL_RELAY_OUTBOUND_QUEUE_CAPACITY - Payloads queued per connection
  SIGNAL_RELAY_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
  SIGNAL_RELAY_METRICS_ENABLED  - Serve /metrics (true/false)
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
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:80)")]
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

    /// Disable the Prometheus endpoint
    #[arg(long, help = "Disable the /metrics endpoint")]
    pub no_metrics: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_filter = init_tracing(&args)?;

    info!("Starting Signal Relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.log_level.as_deref(),
        args.no_metrics,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    apply_log_level(&log_filter, &args, &config.monitoring.log_level)?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!(
            "  Index page: {}",
            config
                .server
                .index_page
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!("  Outbound queue capacity: {}", config.server.outbound_queue_capacity);
        info!(
            "  Metrics: {}",
            if config.monitoring.metrics_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let mut server = RelayServer::new(config, shutdown_coordinator.clone())?;
    let local_addr = server.bind().await?;

    print_banner(local_addr);

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Server error: {}", e);
        }
        server.wait_for_connections_to_close().await;
    });

    tokio::select! {
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
                shutdown_coordinator.trigger();
            }
            if let Err(e) = (&mut server_handle).await {
                error!("Server task failed: {}", e);
            }
        }
        result = &mut server_handle => {
            if let Err(e) = result {
                error!("Server task failed: {}", e);
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Announce the page and signaling URLs
fn print_banner(addr: SocketAddr) {
    let host = match addr {
        _ if addr.ip().is_unspecified() => "localhost".to_string(),
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
    };
    let authority = if addr.port() == 80 {
        host
    } else {
        format!("{}:{}", host, addr.port())
    };

    info!("signaling server starting...");
    info!("   web page: http://{}", authority);
    info!("   signaling: ws://{}", authority);
}

/// Initialize tracing/logging.
///
/// Starts at the level given on the command line so configuration loading
/// is logged; `apply_log_level` switches to the configured level later.
fn init_tracing(args: &CliArgs) -> Result<LogFilterHandle> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or("info")
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();

    Ok(handle)
}

/// Switch to the configured log level unless `RUST_LOG` or `--verbose` decide it
fn apply_log_level(handle: &LogFilterHandle, args: &CliArgs, configured_level: &str) -> Result<()> {
    if args.verbose || std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return Ok(());
    }

    handle
        .reload(EnvFilter::new(configured_level))
        .context("Failed to apply configured log level")
}
