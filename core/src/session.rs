/// Per-connection session state.
use crate::architect::ConversationTurn;
use crate::element::ElementTree;
use crate::state_machine::SessionStateMachine;
use crate::store::ElementStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything one connection owns: its tree, its conversation with the
/// Architect and its processing state. Nothing here is shared.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    pub(crate) store: ElementStore,
    pub(crate) history: Vec<ConversationTurn>,
    pub(crate) machine: SessionStateMachine,
}

impl Session {
    pub fn new(max_queue_depth: Option<usize>) -> Self {
        Self::with_id(Uuid::new_v4(), max_queue_depth)
    }

    pub fn with_id(id: Uuid, max_queue_depth: Option<usize>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            store: ElementStore::new(),
            history: Vec::new(),
            machine: SessionStateMachine::new(max_queue_depth),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn snapshot(&self) -> ElementTree {
        self.store.snapshot()
    }

    /// Completed turns, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.machine
    }
}
