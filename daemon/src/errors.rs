/// Error types for the mediator daemon

use mediator_core::{ArchitectError, MediatorError};
use thiserror::Error;

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),

    /// WebSocket handshake or transport error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection registry error
    #[error("Connection pool error: {0}")]
    PoolError(String),

    /// Metrics error
    #[error("Metrics error: {0}")]
    MetricsError(String),

    /// Architect construction error
    #[error("Architect error: {0}")]
    ArchitectError(#[from] ArchitectError),

    /// Session loop error
    #[error("Session error: {0}")]
    SessionError(#[from] MediatorError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DaemonError {
    /// Stable identifier for this error, for logs and health output
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::ConfigError(_) => "CONFIG_ERROR",
            DaemonError::ServerError(_) => "SERVER_ERROR",
            DaemonError::ConnectionError(_) => "CONNECTION_ERROR",
            DaemonError::PoolError(_) => "POOL_ERROR",
            DaemonError::MetricsError(_) => "METRICS_ERROR",
            DaemonError::ArchitectError(_) => "ARCHITECT_ERROR",
            DaemonError::SessionError(_) => "SESSION_ERROR",
            DaemonError::SerializationError(_) => "SERIALIZATION_ERROR",
            DaemonError::IoError(_) => "IO_ERROR",
        }
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::SerializationError(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DaemonError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DaemonError::ConnectionError(e.to_string())
    }
}

impl From<prometheus::Error> for DaemonError {
    fn from(e: prometheus::Error) -> Self {
        DaemonError::MetricsError(e.to_string())
    }
}
