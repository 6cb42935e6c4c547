//! Per-session processing state machine
//!
//! Gates agent turns so that at most one is in flight per session. Events
//! that arrive while a turn is running are parked in the [`EventQueue`] and
//! handed back one at a time as turns finish.

use crate::architect::AgentEvent;
use crate::errors::ProtocolError;
use crate::queue::EventQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

/// Default number of transitions kept per session.
pub const DEFAULT_TRANSITION_LOG_SIZE: usize = 256;

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingState {
    /// No turn in flight
    Idle,

    /// An agent turn is in flight
    AwaitingAgent,

    /// The current turn failed; left again before control returns
    Error,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Idle => write!(f, "Idle"),
            ProcessingState::AwaitingAgent => write!(f, "AwaitingAgent"),
            ProcessingState::Error => write!(f, "Error"),
        }
    }
}

impl ProcessingState {
    pub fn can_transition_to(&self, target: ProcessingState) -> bool {
        use ProcessingState::*;
        matches!(
            (self, target),
            (Idle, AwaitingAgent)
                | (AwaitingAgent, Idle)
                | (AwaitingAgent, AwaitingAgent)
                | (AwaitingAgent, Error)
                | (Error, Idle)
                | (Error, AwaitingAgent)
        )
    }
}

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Implicit initialization turn on connection open
    Opened,
    /// A client event started a turn
    EventAccepted,
    TurnCompleted,
    TurnFailed,
    /// A queued event started the next turn
    Dequeued,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Opened => "opened",
            Trigger::EventAccepted => "event_accepted",
            Trigger::TurnCompleted => "turn_completed",
            Trigger::TurnFailed => "turn_failed",
            Trigger::Dequeued => "dequeued",
        };
        f.write_str(name)
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: ProcessingState,
    pub to: ProcessingState,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
}

/// What happened to an incoming event.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Start a turn for this event now
    Start(AgentEvent),
    /// A turn is in flight; the event waits at this queue depth
    Queued { depth: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[derive(Debug)]
pub struct SessionStateMachine {
    state: ProcessingState,
    queue: EventQueue,
    transitions: VecDeque<Transition>,
    max_transitions: usize,
}

impl SessionStateMachine {
    /// A fresh session starts in `AwaitingAgent` for its implicit
    /// initialization turn.
    pub fn new(max_queue_depth: Option<usize>) -> Self {
        let mut machine = Self {
            state: ProcessingState::Idle,
            queue: EventQueue::new(max_queue_depth),
            transitions: VecDeque::new(),
            max_transitions: DEFAULT_TRANSITION_LOG_SIZE,
        };
        machine.transition(ProcessingState::AwaitingAgent, Trigger::Opened);
        machine
    }

    pub fn with_transition_log_size(mut self, size: usize) -> Self {
        self.max_transitions = size.max(1);
        while self.transitions.len() > self.max_transitions {
            self.transitions.pop_front();
        }
        self
    }

    pub fn state(&self) -> ProcessingState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == ProcessingState::AwaitingAgent
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Gate an incoming client event.
    pub fn on_event(&mut self, event: AgentEvent) -> Result<Gate, ProtocolError> {
        match self.state {
            ProcessingState::AwaitingAgent => {
                let depth = self.queue.push(event)?;
                debug!(depth, "Turn in flight, event queued");
                Ok(Gate::Queued { depth })
            }
            ProcessingState::Idle | ProcessingState::Error => {
                self.transition(ProcessingState::AwaitingAgent, Trigger::EventAccepted);
                Ok(Gate::Start(event))
            }
        }
    }

    /// Record the end of the in-flight turn and return the next queued
    /// event, if any. When one is returned the machine stays in
    /// `AwaitingAgent` and the caller must start that turn.
    pub fn finish_turn(&mut self, outcome: TurnOutcome) -> Option<AgentEvent> {
        if self.state != ProcessingState::AwaitingAgent {
            warn!(state = %self.state, "finish_turn called with no turn in flight");
            return None;
        }

        if outcome == TurnOutcome::Failed {
            self.transition(ProcessingState::Error, Trigger::TurnFailed);
        }

        match self.queue.pop() {
            Some(next) => {
                self.transition(ProcessingState::AwaitingAgent, Trigger::Dequeued);
                Some(next)
            }
            None => {
                let trigger = match outcome {
                    TurnOutcome::Completed => Trigger::TurnCompleted,
                    TurnOutcome::Failed => Trigger::TurnFailed,
                };
                self.transition(ProcessingState::Idle, trigger);
                None
            }
        }
    }

    fn transition(&mut self, to: ProcessingState, trigger: Trigger) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to) || trigger == Trigger::Opened,
            "illegal transition {} -> {}",
            from,
            to
        );
        self.state = to;
        self.transitions.push_back(Transition {
            from,
            to,
            trigger,
            timestamp: Utc::now(),
        });
        if self.transitions.len() > self.max_transitions {
            self.transitions.pop_front();
        }
    }
}
