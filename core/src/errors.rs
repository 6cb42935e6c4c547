/// Error types for the mediator core.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the element tree store when a mutation would break
/// tree consistency.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown element reference: {0}")]
    UnknownReference(String),

    #[error("Duplicate element id: {0}")]
    DuplicateId(String),

    #[error("Element {parent_id} is a {kind}, only containers can have children")]
    InvalidParent { parent_id: String, kind: String },

    #[error("Element {0} would become its own ancestor")]
    Cycle(String),
}

/// Result type for tree store operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors raised while validating or applying a single tool call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Property '{field}' cannot be changed on a {kind} element")]
    ImmutableProperty { field: String, kind: String },

    #[error("Unknown theme: {0}")]
    UnknownTheme(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Result type for tool execution.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors raised by an Architect invocation.
#[derive(Error, Debug, Clone)]
pub enum ArchitectError {
    #[error("Architect did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ArchitectError {
    fn from(e: reqwest::Error) -> Self {
        ArchitectError::Transport(e.to_string())
    }
}

/// Result type for Architect invocations.
pub type ArchitectResult<T> = Result<T, ArchitectError>;

/// Errors raised while decoding an inbound client envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unknown callback id: {0}")]
    UnknownCallback(String),

    #[error("Event queue is full ({0} pending)")]
    QueueFull(usize),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

/// Errors that end a mediator loop.
#[derive(Error, Debug)]
pub enum MediatorError {
    #[error("Outbound channel closed")]
    OutboundClosed,
}

pub type MediatorResult<T> = Result<T, MediatorError>;

/// Stable error codes carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedEnvelope,
    UnknownCallback,
    QueueFull,
    AgentTimeout,
    AgentInvocationFailed,
}

impl From<&ProtocolError> for ErrorCode {
    fn from(e: &ProtocolError) -> Self {
        match e {
            ProtocolError::Malformed(_) => ErrorCode::MalformedEnvelope,
            ProtocolError::UnknownCallback(_) => ErrorCode::UnknownCallback,
            ProtocolError::QueueFull(_) => ErrorCode::QueueFull,
        }
    }
}

impl From<&ArchitectError> for ErrorCode {
    fn from(e: &ArchitectError) -> Self {
        match e {
            ArchitectError::Timeout(_) => ErrorCode::AgentTimeout,
            _ => ErrorCode::AgentInvocationFailed,
        }
    }
}
