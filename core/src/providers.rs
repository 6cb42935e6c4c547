/// Architect implementations: the HTTP Messages API client and an offline echo architect.
use crate::architect::{AgentEvent, Architect, ArchitectReply, ConversationTurn};
use crate::errors::{ArchitectError, ArchitectResult};
use crate::tools::{tool_definitions, ToolCall, ToolDefinition, ToolOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You design and drive a user interface through tools. \
The user never types; they only see what you build and click buttons. \
Use create_container, display_text and create_button to lay out the UI, \
update_element and delete_element to change it, and apply_theme to style it. \
Give every button a callback_id: when it is clicked you receive that id as the next message. \
Element ids are generated for you and reported in each tool result; \
within one response you may name new elements with a key and use that key as a parent_id. \
Keep replies to the user short.";

// ============================================================================
// ANTHROPIC MESSAGES API
// ============================================================================

/// Architect backed by the Anthropic Messages API.
pub struct AnthropicArchitect {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
}

impl AnthropicArchitect {
    pub fn new(api_key: String, endpoint: Option<String>) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: tool_definitions(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    fn payload(&self, history: &[ConversationTurn], event: &AgentEvent) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": self.system_prompt,
            "tools": self.tools,
            "messages": build_messages(history, event),
        })
    }
}

#[async_trait]
impl Architect for AnthropicArchitect {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(
        &self,
        history: &[ConversationTurn],
        event: &AgentEvent,
    ) -> ArchitectResult<ArchitectReply> {
        debug!(model = %self.model, turns = history.len(), "Calling Messages API");

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.payload(history, event))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(ArchitectError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = serde_json::from_str(&body)
            .map_err(|e| ArchitectError::InvalidResponse(e.to_string()))?;
        parse_reply(&body)
    }
}

fn tool_result_blocks(outcomes: &[ToolOutcome]) -> Vec<Value> {
    outcomes
        .iter()
        .map(|o| {
            json!({
                "type": "tool_result",
                "tool_use_id": o.call_id,
                "content": o.detail,
                "is_error": !o.ok,
            })
        })
        .collect()
}

/// Replay the conversation as alternating user/assistant messages.
///
/// Tool results of a turn open the next user message, ahead of the text of
/// the event that follows.
pub fn build_messages(history: &[ConversationTurn], event: &AgentEvent) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    let mut pending_results: Vec<Value> = Vec::new();

    for turn in history {
        let mut user = std::mem::take(&mut pending_results);
        user.push(json!({"type": "text", "text": turn.event.to_prompt()}));
        messages.push(json!({"role": "user", "content": user}));

        let mut assistant = Vec::new();
        if !turn.reply.is_empty() {
            assistant.push(json!({"type": "text", "text": turn.reply}));
        }
        for call in &turn.tool_calls {
            let input = match &call.arguments {
                Value::Object(_) => call.arguments.clone(),
                _ => json!({}),
            };
            assistant.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": input,
            }));
        }
        if assistant.is_empty() {
            assistant.push(json!({"type": "text", "text": "(no changes)"}));
        }
        messages.push(json!({"role": "assistant", "content": assistant}));

        pending_results = tool_result_blocks(&turn.tool_results);
    }

    let mut user = pending_results;
    user.push(json!({"type": "text", "text": event.to_prompt()}));
    messages.push(json!({"role": "user", "content": user}));
    messages
}

/// Turn a Messages API response body into tool calls and reply text.
pub fn parse_reply(body: &Value) -> ArchitectResult<ArchitectReply> {
    let blocks = body["content"].as_array().ok_or_else(|| {
        ArchitectError::InvalidResponse("response has no content array".to_string())
    })?;

    let mut reply = ArchitectReply::default();
    let mut texts: Vec<&str> = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str() {
                    texts.push(text);
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().ok_or_else(|| {
                    ArchitectError::InvalidResponse("tool_use block without id".to_string())
                })?;
                let name = block["name"].as_str().ok_or_else(|| {
                    ArchitectError::InvalidResponse("tool_use block without name".to_string())
                })?;
                reply
                    .tool_calls
                    .push(ToolCall::new(id, name, block["input"].clone()));
            }
            _ => {}
        }
    }
    reply.reply_text = texts.join("\n");
    Ok(reply)
}

// ============================================================================
// ECHO ARCHITECT
// ============================================================================

pub const WELCOME_MESSAGE: &str =
    "Welcome! I'm the echo architect. Click a button and I'll echo it back.";
const READY_TEXT: &str = "Ready. Click a button.";

/// Deterministic offline architect for local development and tests.
#[derive(Debug, Default)]
pub struct EchoArchitect;

impl EchoArchitect {
    pub fn new() -> Self {
        Self
    }

    fn welcome(&self) -> ArchitectReply {
        ArchitectReply::text(WELCOME_MESSAGE)
            .with_call(ToolCall::new(
                "echo-0",
                "create_container",
                json!({"key": "main", "flex_direction": "column", "gap": "12px"}),
            ))
            .with_call(ToolCall::new(
                "echo-1",
                "display_text",
                json!({"key": "status", "parent_id": "main", "content": READY_TEXT}),
            ))
            .with_call(ToolCall::new(
                "echo-2",
                "create_button",
                json!({"parent_id": "main", "label": "Say hello", "callback_id": "hello"}),
            ))
            .with_call(ToolCall::new(
                "echo-3",
                "create_button",
                json!({"parent_id": "main", "label": "Reset", "callback_id": "reset"}),
            ))
    }
}

/// Id of the status text created by the welcome turn, if it still stands.
fn status_text_id(history: &[ConversationTurn]) -> Option<String> {
    history
        .iter()
        .filter(|turn| turn.event == AgentEvent::Initialize)
        .flat_map(|turn| {
            turn.tool_calls.iter().filter_map(move |call| {
                if call.arguments["key"] != "status" {
                    return None;
                }
                turn.tool_results
                    .iter()
                    .find(|o| o.call_id == call.id && o.ok)
                    .and_then(|o| o.element_id.clone())
            })
        })
        .last()
}

#[async_trait]
impl Architect for EchoArchitect {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(
        &self,
        history: &[ConversationTurn],
        event: &AgentEvent,
    ) -> ArchitectResult<ArchitectReply> {
        let callback_id = match event {
            AgentEvent::Initialize => {
                info!("Building welcome screen");
                return Ok(self.welcome());
            }
            AgentEvent::ButtonClick { callback_id } => callback_id,
        };

        let clicks = history
            .iter()
            .filter(|t| matches!(t.event, AgentEvent::ButtonClick { .. }))
            .count()
            + 1;
        let (status, reply) = if callback_id == "reset" {
            (READY_TEXT.to_string(), "Reset.".to_string())
        } else {
            (
                format!("You clicked '{}' (click #{})", callback_id, clicks),
                format!("You clicked '{}'.", callback_id),
            )
        };

        let call = match status_text_id(history) {
            Some(id) => ToolCall::new(
                format!("echo-click-{}", clicks),
                "update_element",
                json!({"id": id, "content": status}),
            ),
            None => ToolCall::new(
                format!("echo-click-{}", clicks),
                "display_text",
                json!({"content": status}),
            ),
        };
        Ok(ArchitectReply::text(reply).with_call(call))
    }
}
