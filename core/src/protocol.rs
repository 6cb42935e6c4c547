//! Wire envelopes exchanged with the Executor.
//!
//! Every frame is one JSON object tagged by `type`.

use crate::architect::AgentEvent;
use crate::element::ElementTree;
use crate::errors::{ErrorCode, ProtocolError};
use serde::{Deserialize, Serialize};

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Sent immediately on connection open
    Connected,

    /// Result of the implicit first turn
    Init { message: String, ui_state: ElementTree },

    /// Result of any later turn
    Response { message: String, ui_state: ElementTree },

    Error { code: ErrorCode, message: String },
}

impl ServerEnvelope {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEnvelope::Error {
            code,
            message: message.into(),
        }
    }

    /// The `type` tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEnvelope::Connected => "connected",
            ServerEnvelope::Init { .. } => "init",
            ServerEnvelope::Response { .. } => "response",
            ServerEnvelope::Error { .. } => "error",
        }
    }
}

impl From<&ProtocolError> for ServerEnvelope {
    fn from(e: &ProtocolError) -> Self {
        ServerEnvelope::error(ErrorCode::from(e), e.to_string())
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    ButtonClick { callback_id: String },
}

impl ClientEnvelope {
    pub fn into_event(self) -> AgentEvent {
        match self {
            ClientEnvelope::ButtonClick { callback_id } => AgentEvent::ButtonClick { callback_id },
        }
    }
}

/// Decode one client text frame.
pub fn parse_client(text: &str) -> Result<ClientEnvelope, ProtocolError> {
    let envelope: ClientEnvelope = serde_json::from_str(text)?;
    match &envelope {
        ClientEnvelope::ButtonClick { callback_id } if callback_id.is_empty() => Err(
            ProtocolError::Malformed("callback_id must not be empty".to_string()),
        ),
        _ => Ok(envelope),
    }
}
