//! redmine-mcp: MCP server for the Redmine REST API
//!
//! Serves MCP over stdio and, alongside it, a small liveness endpoint for
//! container platforms.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use redmine_mcp::config::{self, ENV_PORT};
use redmine_mcp::health;
use redmine_mcp::mcp::server::McpServer;
use redmine_mcp::openapi::{ApiDocument, PathCatalog};
use redmine_mcp::redmine::RedmineClient;

/// How often health-only mode reports that it is still alive.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// MCP server for the Redmine REST API.
///
/// Forwards tool calls to a Redmine instance, serves its OpenAPI document and
/// transfers attachments. Connection settings come from the configuration
/// file and the REDMINE_URL and REDMINE_API_KEY environment variables.
#[derive(Parser, Debug)]
#[command(name = "redmine-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Only serve the liveness endpoint; do not read MCP messages from stdin
    #[arg(long)]
    health_only: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Keeps the process alive until SIGINT or SIGTERM.
#[cfg(unix)]
async fn keep_alive() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => debug!("Health-only mode, still running"),
        }
    }
}

/// Keeps the process alive until Ctrl+C.
#[cfg(windows)]
async fn keep_alive() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                return result;
            }
            _ = ticker.tick() => debug!("Health-only mode, still running"),
        }
    }
}

/// Entry point for the redmine-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!(
                        "\nSet REDMINE_URL and REDMINE_API_KEY, or create a config file at: {}",
                        default_path.display()
                    );
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    for warning in cfg.warnings() {
        warn!("{warning}");
    }

    let connection = match cfg.connection() {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %connection.base_url,
        timeout_secs = connection.timeout.as_secs(),
        "Starting redmine-mcp server"
    );

    if !connection.base_url.path().ends_with('/') {
        warn!(
            url = %connection.base_url,
            "Redmine URL path does not end with '/'; its last segment is replaced by request paths"
        );
    }

    let document = match ApiDocument::load(cfg.openapi_path.as_deref()) {
        Ok(document) => document,
        Err(e) => {
            error!(error = %e, "Failed to load OpenAPI document");
            return ExitCode::FAILURE;
        }
    };

    let client = match RedmineClient::new(&connection) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let health_only = args.health_only || std::env::var_os(ENV_PORT).is_some();

    // The handle is held for the whole run; the server thread outlives it anyway.
    let _health = if cfg.health.enabled || health_only {
        health::start(cfg.health.port)
    } else {
        info!("Health check server disabled");
        None
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = if health_only {
        info!(port = cfg.health.port, "Running in health-only mode");
        runtime.block_on(keep_alive())
    } else {
        let mut server = McpServer::new(
            client,
            PathCatalog::new(document),
            connection.request_instructions,
        );
        info!("MCP server ready, waiting for client connection...");
        runtime.block_on(server.run())
    };

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
