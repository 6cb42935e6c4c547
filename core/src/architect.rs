/// The Architect collaborator: the external agent that designs the UI.
use crate::errors::ArchitectResult;
use crate::tools::{ToolCall, ToolOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An event handed to the Architect as the input of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Implicit first turn of every session
    Initialize,
    ButtonClick { callback_id: String },
}

impl AgentEvent {
    /// Plain-text rendering of the event used as the user message.
    pub fn to_prompt(&self) -> String {
        match self {
            AgentEvent::Initialize => {
                "A new user has connected. The UI is empty. Build the initial interface."
                    .to_string()
            }
            AgentEvent::ButtonClick { callback_id } => {
                format!("The user clicked the button with callback_id '{}'.", callback_id)
            }
        }
    }
}

/// One completed exchange with the Architect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub event: AgentEvent,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolOutcome>,
    pub reply: String,
}

/// What the Architect returned for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectReply {
    pub tool_calls: Vec<ToolCall>,
    pub reply_text: String,
}

impl ArchitectReply {
    pub fn text(reply_text: impl Into<String>) -> Self {
        Self {
            tool_calls: Vec::new(),
            reply_text: reply_text.into(),
        }
    }

    pub fn with_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// The agent seen as an opaque function of history and event.
#[async_trait]
pub trait Architect: Send + Sync {
    /// Name of this architect, used in logs.
    fn name(&self) -> &str;

    /// Run one turn. `history` holds every earlier completed turn in order.
    async fn invoke(
        &self,
        history: &[ConversationTurn],
        event: &AgentEvent,
    ) -> ArchitectResult<ArchitectReply>;
}

pub type SharedArchitect = Arc<dyn Architect>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::ButtonClick {
            callback_id: "clear".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "button_click", "callback_id": "clear"})
        );
        assert!(event.to_prompt().contains("'clear'"));
    }
}
