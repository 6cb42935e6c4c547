/// Mediator Daemon: WebSocket sessions between an Architect and UI clients
/// Provides the session listener, health endpoints and Prometheus metrics
pub mod config;
pub mod errors;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod ws_session;

// Re-export commonly used types
pub use config::{
    ArchitectConfig, ArchitectProvider, DaemonConfig, LoggingConfig, ServerConfig, SessionConfig,
};
pub use errors::{DaemonError, DaemonResult};
pub use metrics::MetricsCollector;
pub use pool::{ConnectionInfo, ConnectionRegistry};
pub use server::MediatorServer;
pub use ws_session::{handle_session, SessionContext};

/// Daemon version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
