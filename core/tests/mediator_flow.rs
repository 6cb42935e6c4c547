//! Integration tests for the mediator loop
//!
//! Drives a session through in-memory channels with a scripted architect
//! and checks ordering, mutual exclusion and error surfacing.

use async_trait::async_trait;
use mediator_core::{
    AgentEvent, Architect, ArchitectError, ArchitectReply, ArchitectResult, ConversationTurn,
    ErrorCode, Mediator, MediatorConfig, MediatorResult, ProcessingState, ServerEnvelope, Session,
    ToolCall,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

type ClickScript = Box<dyn Fn(&str) -> ArchitectResult<ArchitectReply> + Send + Sync>;

/// Architect that builds a fixed first screen and answers clicks from a script,
/// recording what it saw and how many invocations overlapped.
struct ScriptedArchitect {
    delay: Duration,
    on_click: ClickScript,
    running: AtomicUsize,
    max_running: AtomicUsize,
    failing_inits: AtomicUsize,
    seen: Mutex<Vec<AgentEvent>>,
}

impl ScriptedArchitect {
    fn new(delay: Duration) -> Self {
        Self::with_script(
            delay,
            Box::new(|callback_id| {
                Ok(ArchitectReply::text(format!("clicked {}", callback_id)).with_call(ToolCall::new(
                    format!("call-{}", callback_id),
                    "display_text",
                    json!({"content": callback_id}),
                )))
            }),
        )
    }

    fn with_script(delay: Duration, on_click: ClickScript) -> Self {
        Self {
            delay,
            on_click,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            failing_inits: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `count` initialization turns.
    fn failing_inits(self, count: usize) -> Self {
        self.failing_inits.store(count, Ordering::SeqCst);
        self
    }

    fn seen(&self) -> Vec<AgentEvent> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Architect for ScriptedArchitect {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        _history: &[ConversationTurn],
        event: &AgentEvent,
    ) -> ArchitectResult<ArchitectReply> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().unwrap().push(event.clone());

        tokio::time::sleep(self.delay).await;

        let init_fails = *event == AgentEvent::Initialize
            && self
                .failing_inits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

        let reply = match event {
            AgentEvent::Initialize if init_fails => Err(ArchitectError::Transport(
                "connection refused".to_string(),
            )),
            AgentEvent::Initialize => Ok(ArchitectReply::text("calculator ready")
                .with_call(ToolCall::new(
                    "init-0",
                    "create_container",
                    json!({"key": "pad", "flex_direction": "row"}),
                ))
                .with_call(ToolCall::new(
                    "init-1",
                    "create_button",
                    json!({"label": "C", "callback_id": "clear", "parent_id": "pad"}),
                ))
                .with_call(ToolCall::new(
                    "init-2",
                    "create_button",
                    json!({"label": "1", "callback_id": "digit_1", "parent_id": "pad"}),
                ))),
            AgentEvent::ButtonClick { callback_id } => (self.on_click)(callback_id),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

struct Harness {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<ServerEnvelope>,
    handle: JoinHandle<MediatorResult<Session>>,
}

impl Harness {
    fn start(architect: Arc<ScriptedArchitect>, config: MediatorConfig) -> Self {
        let (tx, in_rx) = mpsc::channel(64);
        let (out_tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(Mediator::new(architect, config).run(in_rx, out_tx));
        Self { tx, rx, handle }
    }

    /// Start a session and consume `connected` and `init`.
    async fn open(architect: Arc<ScriptedArchitect>) -> Self {
        Self::open_with(architect, MediatorConfig::default()).await
    }

    async fn open_with(architect: Arc<ScriptedArchitect>, config: MediatorConfig) -> Self {
        let mut harness = Self::start(architect, config);
        assert_eq!(harness.next().await, ServerEnvelope::Connected);
        assert!(matches!(harness.next().await, ServerEnvelope::Init { .. }));
        harness
    }

    async fn click(&self, callback_id: &str) {
        self.send(&json!({"type": "button_click", "callback_id": callback_id}).to_string())
            .await;
    }

    async fn send(&self, text: &str) {
        self.tx.send(text.to_string()).await.unwrap();
    }

    async fn next(&mut self) -> ServerEnvelope {
        timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for envelope")
            .expect("outbound channel closed")
    }

    async fn close(self) -> Session {
        drop(self.tx);
        self.handle.await.unwrap().unwrap()
    }
}

fn response_message(envelope: ServerEnvelope) -> String {
    match envelope {
        ServerEnvelope::Response { message, .. } => message,
        other => panic!("expected response, got {:?}", other),
    }
}

fn error_code(envelope: ServerEnvelope) -> ErrorCode {
    match envelope {
        ServerEnvelope::Error { code, .. } => code,
        other => panic!("expected error, got {:?}", other),
    }
}

fn click(callback_id: &str) -> AgentEvent {
    AgentEvent::ButtonClick {
        callback_id: callback_id.to_string(),
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_fresh_session_connected_then_init_then_response() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(5)));
    let mut harness = Harness::start(architect.clone(), MediatorConfig::default());

    assert_eq!(harness.next().await, ServerEnvelope::Connected);
    let init_state = match harness.next().await {
        ServerEnvelope::Init { message, ui_state } => {
            assert_eq!(message, "calculator ready");
            ui_state
        }
        other => panic!("expected init, got {:?}", other),
    };
    assert_eq!(init_state.len(), 3);
    let roots = init_state.nest();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].children.len(), 2);

    harness.click("clear").await;
    match harness.next().await {
        ServerEnvelope::Response { message, ui_state } => {
            assert_eq!(message, "clicked clear");
            assert_eq!(ui_state.len(), 4);
            // Everything from the first screen is still there, unchanged.
            for element in &init_state.elements {
                assert_eq!(ui_state.get(&element.id), Some(element));
            }
        }
        other => panic!("expected response, got {:?}", other),
    }

    let session = harness.close().await;
    assert_eq!(session.history().len(), 2);
    assert_eq!(architect.seen(), vec![AgentEvent::Initialize, click("clear")]);
}

#[tokio::test]
async fn test_back_to_back_clicks_produce_ordered_responses() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(50)));
    let mut harness = Harness::open(architect.clone()).await;

    harness.click("clear").await;
    harness.click("digit_1").await;

    assert_eq!(response_message(harness.next().await), "clicked clear");
    assert_eq!(response_message(harness.next().await), "clicked digit_1");
    assert_eq!(
        architect.seen(),
        vec![AgentEvent::Initialize, click("clear"), click("digit_1")]
    );
}

#[tokio::test]
async fn test_non_json_text_yields_single_error_and_session_continues() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(5)));
    let mut harness = Harness::open(architect).await;

    harness.send("this is not json").await;
    assert_eq!(error_code(harness.next().await), ErrorCode::MalformedEnvelope);

    harness.click("digit_1").await;
    assert_eq!(response_message(harness.next().await), "clicked digit_1");

    let session = harness.close().await;
    assert_eq!(session.machine().state(), ProcessingState::Idle);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_queued_events_are_replayed_in_arrival_order() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(20)));
    let mut harness = Harness::open(architect.clone()).await;

    let order = ["clear", "digit_1", "digit_1", "clear", "digit_1"];
    for callback_id in order {
        harness.click(callback_id).await;
    }
    for callback_id in order {
        assert_eq!(
            response_message(harness.next().await),
            format!("clicked {}", callback_id)
        );
    }

    let expected: Vec<AgentEvent> = std::iter::once(AgentEvent::Initialize)
        .chain(order.iter().map(|c| click(c)))
        .collect();
    assert_eq!(architect.seen(), expected);

    // The machine stayed busy while draining: one return to Idle per drain.
    let session = harness.close().await;
    let idles = session
        .machine()
        .transitions()
        .filter(|t| t.to == ProcessingState::Idle)
        .count();
    assert!(idles <= 2, "flickered to Idle {} times", idles);
}

#[tokio::test]
async fn test_at_most_one_turn_in_flight_under_concurrent_injection() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(3)));
    let mut harness = Harness::open(architect.clone()).await;

    let mut injectors = Vec::new();
    for worker in 0..4 {
        let tx = harness.tx.clone();
        injectors.push(tokio::spawn(async move {
            for i in 0..5 {
                let callback_id = if (worker + i) % 2 == 0 { "clear" } else { "digit_1" };
                let frame = json!({"type": "button_click", "callback_id": callback_id});
                tx.send(frame.to_string()).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for injector in injectors {
        injector.await.unwrap();
    }

    for _ in 0..20 {
        response_message(harness.next().await);
    }
    assert_eq!(architect.max_running.load(Ordering::SeqCst), 1);
    assert_eq!(architect.seen().len(), 21);
}

#[tokio::test]
async fn test_rejected_tool_call_does_not_block_valid_ones() {
    let architect = Arc::new(ScriptedArchitect::with_script(
        Duration::from_millis(1),
        Box::new(|_| {
            Ok(ArchitectReply::text("partial")
                .with_call(ToolCall::new("a", "display_text", json!({"content": "first"})))
                .with_call(ToolCall::new("b", "delete_element", json!({"id": "container-42"})))
                .with_call(ToolCall::new(
                    "c",
                    "update_element",
                    json!({"id": "button-1", "content": "x"}),
                ))
                .with_call(ToolCall::new(
                    "d",
                    "create_button",
                    json!({"label": "=", "callback_id": "equals"}),
                )))
        }),
    ));
    let mut harness = Harness::open(architect).await;

    harness.click("clear").await;
    match harness.next().await {
        ServerEnvelope::Response { ui_state, .. } => {
            assert_eq!(ui_state.len(), 5);
            assert!(ui_state.has_callback("equals"));
        }
        other => panic!("expected response, got {:?}", other),
    }

    let session = harness.close().await;
    let results = &session.history()[1].tool_results;
    let ok: Vec<bool> = results.iter().map(|r| r.ok).collect();
    assert_eq!(ok, vec![true, false, false, true]);
}

#[tokio::test]
async fn test_agent_failure_surfaces_error_and_queue_keeps_draining() {
    let architect = Arc::new(ScriptedArchitect::with_script(
        Duration::from_millis(30),
        Box::new(|callback_id| {
            if callback_id == "digit_1" {
                Err(ArchitectError::Transport("connection reset".to_string()))
            } else {
                Ok(ArchitectReply::text(format!("clicked {}", callback_id)))
            }
        }),
    ));
    let mut harness = Harness::open(architect.clone()).await;

    harness.click("digit_1").await;
    harness.click("clear").await;

    assert_eq!(error_code(harness.next().await), ErrorCode::AgentInvocationFailed);
    assert_eq!(response_message(harness.next().await), "clicked clear");

    let session = harness.close().await;
    // The failed turn left no trace in the history.
    let events: Vec<AgentEvent> = session.history().iter().map(|t| t.event.clone()).collect();
    assert_eq!(events, vec![AgentEvent::Initialize, click("clear")]);
    assert_eq!(session.machine().state(), ProcessingState::Idle);
}

#[tokio::test]
async fn test_click_after_failed_init_retries_initialization() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(1)).failing_inits(1));
    let mut harness = Harness::start(architect.clone(), MediatorConfig::default());

    assert_eq!(harness.next().await, ServerEnvelope::Connected);
    match harness.next().await {
        ServerEnvelope::Error { code, .. } => assert_eq!(code, ErrorCode::AgentInvocationFailed),
        other => panic!("expected error, got {:?}", other),
    }

    harness.click("retry").await;
    match harness.next().await {
        ServerEnvelope::Init { ui_state, .. } => assert_eq!(ui_state.len(), 3),
        other => panic!("expected init, got {:?}", other),
    }

    // The retried screen is live: its buttons start ordinary turns.
    harness.click("digit_1").await;
    assert_eq!(response_message(harness.next().await), "clicked digit_1");

    assert_eq!(
        architect.seen(),
        vec![
            AgentEvent::Initialize,
            AgentEvent::Initialize,
            AgentEvent::ButtonClick {
                callback_id: "digit_1".to_string()
            },
        ]
    );
    let session = harness.close().await;
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_full_queue_refuses_events() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(100)));
    let config = MediatorConfig {
        max_queue_depth: Some(1),
        ..MediatorConfig::default()
    };
    let mut harness = Harness::open_with(architect, config).await;

    harness.click("clear").await;
    harness.click("digit_1").await;
    harness.click("clear").await;

    assert_eq!(error_code(harness.next().await), ErrorCode::QueueFull);
    assert_eq!(response_message(harness.next().await), "clicked clear");
    assert_eq!(response_message(harness.next().await), "clicked digit_1");
}

#[tokio::test]
async fn test_unknown_callback_leaves_session_untouched() {
    let architect = Arc::new(ScriptedArchitect::new(Duration::from_millis(1)));
    let mut harness = Harness::open(architect.clone()).await;

    harness.click("self_destruct").await;
    assert_eq!(error_code(harness.next().await), ErrorCode::UnknownCallback);

    let session = harness.close().await;
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.snapshot().len(), 3);
    assert_eq!(architect.seen(), vec![AgentEvent::Initialize]);
}
