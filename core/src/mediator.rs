//! Mediator loop
//!
//! One loop per open connection. It reads client frames from an inbound
//! channel and writes envelopes to an outbound channel, so it knows nothing
//! about the transport. The loop suspends only on the next frame and on the
//! in-flight agent turn; tool application and snapshotting run between
//! those awaits, so two snapshots never interleave.

use crate::architect::{AgentEvent, ArchitectReply, ConversationTurn, SharedArchitect};
use crate::errors::{
    ArchitectError, ArchitectResult, ErrorCode, MediatorError, MediatorResult, ProtocolError,
};
use crate::protocol::{parse_client, ServerEnvelope};
use crate::session::Session;
use crate::state_machine::{Gate, TurnOutcome};
use crate::tools::apply_all;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Default upper bound on one Architect invocation.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct MediatorConfig {
    pub turn_timeout: Duration,
    /// `None` leaves the event queue unbounded.
    pub max_queue_depth: Option<usize>,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            max_queue_depth: None,
        }
    }
}

/// Hooks for counting what a session does. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn turn_started(&self) {}
    fn turn_finished(&self, _elapsed: Duration, _ok: bool) {}
    fn tool_calls_rejected(&self, _count: usize) {}
    fn event_queued(&self) {}
}

struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// The agent turn currently running.
struct InFlight {
    event: AgentEvent,
    started: Instant,
    handle: JoinHandle<ArchitectResult<ArchitectReply>>,
}

pub struct Mediator {
    session: Session,
    architect: SharedArchitect,
    config: MediatorConfig,
    observer: Arc<dyn SessionObserver>,
    in_flight: Option<InFlight>,
    /// Set once an `init` envelope has gone out.
    initialized: bool,
}

impl Mediator {
    pub fn new(architect: SharedArchitect, config: MediatorConfig) -> Self {
        let session = Session::new(config.max_queue_depth);
        Self::with_session(session, architect, config)
    }

    pub fn with_session(
        session: Session,
        architect: SharedArchitect,
        config: MediatorConfig,
    ) -> Self {
        Self {
            session,
            architect,
            config,
            observer: Arc::new(NoopObserver),
            in_flight: None,
            initialized: false,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the inbound channel closes, then return the session.
    ///
    /// A turn still in flight at close is left to finish on its own and its
    /// result is discarded.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<ServerEnvelope>,
    ) -> MediatorResult<Session> {
        let session_id = self.session.id();
        info!(session_id = %session_id, architect = self.architect.name(), "Session opened");

        let result = self.drive(&mut inbound, &outbound).await;

        if let Some(turn) = self.in_flight.take() {
            debug!(session_id = %session_id, "Connection closed with a turn in flight");
            tokio::spawn(async move {
                match turn.handle.await {
                    Ok(Ok(_)) => {
                        debug!(session_id = %session_id, "Discarded result of finished turn")
                    }
                    Ok(Err(e)) => debug!(session_id = %session_id, "Discarded failed turn: {}", e),
                    Err(e) => warn!(session_id = %session_id, "Discarded turn task failed: {}", e),
                }
            });
        }

        info!(
            session_id = %session_id,
            turns = self.session.history.len(),
            open_secs = (Utc::now() - self.session.created_at()).num_seconds(),
            "Session closed"
        );
        result.map(|_| self.session)
    }

    async fn drive(
        &mut self,
        inbound: &mut mpsc::Receiver<String>,
        outbound: &mpsc::Sender<ServerEnvelope>,
    ) -> MediatorResult<()> {
        send(outbound, ServerEnvelope::Connected).await?;
        self.start_turn(AgentEvent::Initialize);

        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(text) => self.handle_frame(&text, outbound).await?,
                    None => return Ok(()),
                },
                joined = join_in_flight(&mut self.in_flight), if self.in_flight.is_some() => {
                    if let Some(turn) = self.in_flight.take() {
                        self.complete_turn(turn, joined, outbound).await?;
                    }
                }
            }
        }
    }

    /// The welcome turn failed and nothing is running, so the tree is empty.
    fn init_pending(&self) -> bool {
        !self.initialized && self.in_flight.is_none()
    }

    async fn handle_frame(
        &mut self,
        text: &str,
        outbound: &mpsc::Sender<ServerEnvelope>,
    ) -> MediatorResult<()> {
        let session_id = self.session.id();
        debug!(session_id = %session_id, frame = %text, "Client frame");

        let event = match parse_client(text) {
            Ok(envelope) => envelope.into_event(),
            Err(e) => {
                warn!(session_id = %session_id, "Rejected client frame: {}", e);
                return send(outbound, ServerEnvelope::from(&e)).await;
            }
        };

        let event = match event {
            AgentEvent::ButtonClick { .. } if self.init_pending() => {
                info!(session_id = %session_id, "Retrying initialization");
                AgentEvent::Initialize
            }
            AgentEvent::ButtonClick { ref callback_id }
                if !self.session.store.has_callback(callback_id) =>
            {
                let e = ProtocolError::UnknownCallback(callback_id.clone());
                warn!(session_id = %session_id, "Rejected client frame: {}", e);
                return send(outbound, ServerEnvelope::from(&e)).await;
            }
            event => event,
        };

        match self.session.machine.on_event(event) {
            Ok(Gate::Start(event)) => self.start_turn(event),
            Ok(Gate::Queued { depth }) => {
                info!(session_id = %session_id, depth, "Event queued behind running turn");
                self.observer.event_queued();
            }
            Err(e) => {
                warn!(session_id = %session_id, "Refused event: {}", e);
                send(outbound, ServerEnvelope::from(&e)).await?;
            }
        }
        Ok(())
    }

    fn start_turn(&mut self, event: AgentEvent) {
        debug_assert!(self.in_flight.is_none(), "a turn is already in flight");

        let architect = self.architect.clone();
        let history = self.session.history.clone();
        let timeout = self.config.turn_timeout;
        let turn_event = event.clone();

        info!(
            session_id = %self.session.id(),
            turn = self.session.history.len() + 1,
            event = ?event,
            "Starting agent turn"
        );
        self.observer.turn_started();

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, architect.invoke(&history, &turn_event)).await {
                Ok(result) => result,
                Err(_) => Err(ArchitectError::Timeout(timeout)),
            }
        });

        self.in_flight = Some(InFlight {
            event,
            started: Instant::now(),
            handle,
        });
    }

    async fn complete_turn(
        &mut self,
        turn: InFlight,
        joined: Result<ArchitectResult<ArchitectReply>, JoinError>,
        outbound: &mpsc::Sender<ServerEnvelope>,
    ) -> MediatorResult<()> {
        let session_id = self.session.id();
        let elapsed = turn.started.elapsed();
        let result = joined.unwrap_or_else(|e| {
            Err(ArchitectError::Transport(format!("agent task failed: {}", e)))
        });

        let outcome = match result {
            Ok(reply) => {
                let results = apply_all(&mut self.session.store, &reply.tool_calls);
                let rejected = results.iter().filter(|r| !r.ok).count();
                if rejected > 0 {
                    self.observer.tool_calls_rejected(rejected);
                }

                let ui_state = self.session.store.snapshot();
                let message = reply.reply_text.clone();
                let initial = turn.event == AgentEvent::Initialize;
                self.session.history.push(ConversationTurn {
                    event: turn.event,
                    tool_calls: reply.tool_calls,
                    tool_results: results,
                    reply: reply.reply_text,
                });

                info!(
                    session_id = %session_id,
                    turn = self.session.history.len(),
                    rejected,
                    elements = ui_state.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Agent turn completed"
                );

                let envelope = if initial {
                    self.initialized = true;
                    ServerEnvelope::Init { message, ui_state }
                } else {
                    ServerEnvelope::Response { message, ui_state }
                };
                send(outbound, envelope).await?;
                TurnOutcome::Completed
            }
            Err(e) => {
                error!(session_id = %session_id, event = ?turn.event, "Agent turn failed: {}", e);
                send(outbound, ServerEnvelope::error(ErrorCode::from(&e), e.to_string())).await?;
                TurnOutcome::Failed
            }
        };

        self.observer.turn_finished(elapsed, outcome == TurnOutcome::Completed);

        if let Some(next) = self.session.machine.finish_turn(outcome) {
            self.start_turn(next);
        }
        Ok(())
    }
}

async fn join_in_flight(
    turn: &mut Option<InFlight>,
) -> Result<ArchitectResult<ArchitectReply>, JoinError> {
    match turn {
        Some(turn) => (&mut turn.handle).await,
        None => std::future::pending().await,
    }
}

async fn send(
    outbound: &mpsc::Sender<ServerEnvelope>,
    envelope: ServerEnvelope,
) -> MediatorResult<()> {
    debug!(kind = envelope.kind(), "Sending envelope");
    outbound
        .send(envelope)
        .await
        .map_err(|_| MediatorError::OutboundClosed)
}
