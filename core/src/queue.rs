//! FIFO buffer for client events that arrive while an agent turn is in flight.

use crate::architect::AgentEvent;
use crate::errors::ProtocolError;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<AgentEvent>,
    capacity: Option<usize>,
}

impl EventQueue {
    /// Create a queue; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Append an event and return the new depth.
    pub fn push(&mut self, event: AgentEvent) -> Result<usize, ProtocolError> {
        if let Some(capacity) = self.capacity {
            if self.events.len() >= capacity {
                return Err(ProtocolError::QueueFull(self.events.len()));
            }
        }
        self.events.push_back(event);
        Ok(self.events.len())
    }

    /// Take the oldest event.
    pub fn pop(&mut self) -> Option<AgentEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
