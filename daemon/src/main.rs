/// Mediator Daemon - Main entry point
/// Serves agent-driven UI sessions over WebSocket
use clap::Parser;
use mediator_daemon::{ArchitectProvider, DaemonConfig, MediatorServer};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mediator-daemon",
    about = "Serves agent-driven UI sessions over WebSocket",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    /// HTTP server port
    #[arg(long, value_name = "PORT", help = "HTTP health port (default: 8000)")]
    http_port: Option<u16>,

    /// WebSocket server port
    #[arg(
        short,
        long,
        value_name = "PORT",
        help = "WebSocket session port (default: 8001)"
    )]
    ws_port: Option<u16>,

    /// Architect provider
    #[arg(
        short,
        long,
        value_name = "PROVIDER",
        help = "Architect provider (anthropic, echo)"
    )]
    provider: Option<ArchitectProvider>,

    /// Log level
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Pick up ANTHROPIC_API_KEY and friends from .env
    let dotenv_path = dotenvy::dotenv().ok();

    // Load configuration
    let mut config = DaemonConfig::load_or_default(args.config.as_deref())?;

    // Setup logging
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        args.log_level.clone().unwrap_or_else(|| config.logging.level.clone())
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.parse()?))
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true);
    if config.logging.format == "compact" {
        subscriber.compact().init();
    } else {
        subscriber.init();
    }

    info!("Starting Mediator Daemon v{}", mediator_daemon::VERSION);
    match &args.config {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("Using default configuration"),
    }
    if let Some(path) = dotenv_path {
        info!("Loaded environment from: {}", path.display());
    }

    // Apply CLI overrides
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if let Some(port) = args.ws_port {
        config.server.ws_port = port;
    }
    match args.provider {
        Some(provider) => config.architect.provider = provider,
        None => {
            if config.architect.provider == ArchitectProvider::Anthropic
                && config.architect.resolve_api_key().is_none()
            {
                warn!(
                    "{} not set; falling back to the echo architect",
                    config.architect.api_key_env
                );
                config.architect.provider = ArchitectProvider::Echo;
            }
        }
    }

    // Validate configuration
    config.validate()?;

    info!(
        "Server configuration: HTTP {}:{}, WebSocket {}:{}, architect {}",
        config.server.http_addr,
        config.server.http_port,
        config.server.ws_addr,
        config.server.ws_port,
        config.architect.provider
    );

    let server = MediatorServer::new(config)?;

    // Setup signal handling for graceful shutdown
    let shutdown = async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for CTRL+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received CTRL+C signal"),
            () = terminate => info!("Received SIGTERM signal"),
        }
    };

    // Run server in background
    let server_handle = tokio::spawn(async move { server.run().await });

    tokio::select! {
        _ = shutdown => {
            info!("Shutting down daemon...");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server terminated"),
                Ok(Err(e)) => {
                    error!("Server stopped [{}]: {}", e.code(), e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Server task failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    info!("Mediator Daemon stopped");
    Ok(())
}
