/// Daemon configuration
use crate::errors::{DaemonError, DaemonResult};
use mediator_core::providers::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use mediator_core::{AnthropicArchitect, EchoArchitect, MediatorConfig, SharedArchitect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub architect: ArchitectConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP (health) bind address
    pub http_addr: String,
    /// HTTP (health) port
    pub http_port: u16,
    /// WebSocket bind address
    pub ws_addr: String,
    /// WebSocket port
    pub ws_port: u16,
    /// Max concurrent sessions
    pub max_connections: usize,
    /// Enable metrics endpoint
    pub enable_metrics: bool,
    /// Metrics port
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_addr: "127.0.0.1".to_string(),
            http_port: 8000,
            ws_addr: "127.0.0.1".to_string(),
            ws_port: 8001,
            max_connections: 1000,
            enable_metrics: true,
            metrics_port: 9090,
        }
    }
}

/// Which Architect backs the sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchitectProvider {
    Anthropic,
    Echo,
}

impl fmt::Display for ArchitectProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchitectProvider::Anthropic => write!(f, "anthropic"),
            ArchitectProvider::Echo => write!(f, "echo"),
        }
    }
}

impl FromStr for ArchitectProvider {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ArchitectProvider::Anthropic),
            "echo" => Ok(ArchitectProvider::Echo),
            other => Err(DaemonError::ConfigError(format!(
                "Unknown architect provider: {}",
                other
            ))),
        }
    }
}

/// Architect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectConfig {
    pub provider: ArchitectProvider,
    pub model: String,
    /// API base URL; the provider default when unset
    pub endpoint: Option<String>,
    /// API key; read from `api_key_env` when unset
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub max_tokens: u32,
    /// Upper bound on one agent turn
    pub timeout_secs: u64,
    /// Overrides the built-in system prompt
    pub system_prompt: Option<String>,
}

impl Default for ArchitectConfig {
    fn default() -> Self {
        ArchitectConfig {
            provider: ArchitectProvider::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            api_key: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl ArchitectConfig {
    /// The configured key, or the environment variable named by `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Build the Architect shared by every session.
    pub fn build(&self) -> DaemonResult<SharedArchitect> {
        match self.provider {
            ArchitectProvider::Echo => Ok(Arc::new(EchoArchitect::new())),
            ArchitectProvider::Anthropic => {
                let api_key = self.resolve_api_key().ok_or_else(|| {
                    DaemonError::ConfigError(format!(
                        "{} not found in environment. Please set it in .env file.",
                        self.api_key_env
                    ))
                })?;
                let mut architect = AnthropicArchitect::new(api_key, self.endpoint.clone())
                    .with_model(self.model.clone())
                    .with_max_tokens(self.max_tokens);
                if let Some(prompt) = &self.system_prompt {
                    architect = architect.with_system_prompt(prompt.clone());
                }
                Ok(Arc::new(architect))
            }
        }
    }
}

/// Per-session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the outbound envelope channel
    pub outbound_buffer: usize,
    /// Bound on queued events; unbounded when unset
    pub max_queue_depth: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            outbound_buffer: 32,
            max_queue_depth: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// `full` or `compact`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DaemonError::ConfigError(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DaemonError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from TOML file or use defaults
    pub fn load_or_default(path: Option<&Path>) -> DaemonResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Settings handed to each session's mediator loop
    pub fn mediator_config(&self) -> MediatorConfig {
        MediatorConfig {
            turn_timeout: Duration::from_secs(self.architect.timeout_secs),
            max_queue_depth: self.session.max_queue_depth,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DaemonResult<()> {
        if self.server.http_port == 0 || self.server.ws_port == 0 {
            return Err(DaemonError::ConfigError(
                "http_port and ws_port must be non-zero".to_string(),
            ));
        }

        if self.server.enable_metrics && self.server.metrics_port == 0 {
            return Err(DaemonError::ConfigError(
                "metrics_port must be non-zero when metrics are enabled".to_string(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(DaemonError::ConfigError(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.architect.timeout_secs == 0 {
            return Err(DaemonError::ConfigError(
                "architect.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.session.outbound_buffer == 0 {
            return Err(DaemonError::ConfigError(
                "session.outbound_buffer must be greater than 0".to_string(),
            ));
        }

        if self.session.max_queue_depth == Some(0) {
            return Err(DaemonError::ConfigError(
                "session.max_queue_depth must be greater than 0 when set".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "full" | "compact") {
            return Err(DaemonError::ConfigError(format!(
                "Unknown log format: {}",
                self.logging.format
            )));
        }

        if self.architect.provider == ArchitectProvider::Anthropic
            && self.architect.resolve_api_key().is_none()
        {
            return Err(DaemonError::ConfigError(format!(
                "An API key is required for the anthropic provider (set architect.api_key or {})",
                self.architect.api_key_env
            )));
        }

        Ok(())
    }
}
