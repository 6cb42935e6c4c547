// Mediator: agent-driven UI sessions
// Core library providing the element tree, tool application, session state and the mediator loop

pub mod architect;
pub mod element;
pub mod errors;
pub mod mediator;
pub mod protocol;
pub mod providers;
pub mod queue;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod themes;
pub mod tools;

// Re-export commonly used types
pub use errors::{
    ArchitectError, ArchitectResult, ErrorCode, MediatorError, MediatorResult, ProtocolError,
    ToolError, ToolResult, TreeError, TreeResult,
};

pub use element::{Element, ElementKind, ElementTree, ThemeVariables, TreeNode};
pub use store::{Applied, ElementStore, Mutation, NewElement};
pub use tools::{
    apply_all, tool_definitions, ToolApplier, ToolCall, ToolDefinition, ToolName, ToolOutcome,
};

pub use architect::{AgentEvent, Architect, ArchitectReply, ConversationTurn, SharedArchitect};
pub use providers::{AnthropicArchitect, EchoArchitect};

pub use protocol::{parse_client, ClientEnvelope, ServerEnvelope};
pub use queue::EventQueue;
pub use session::Session;
pub use state_machine::{
    Gate, ProcessingState, SessionStateMachine, Transition, Trigger, TurnOutcome,
};

pub use mediator::{Mediator, MediatorConfig, SessionObserver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
