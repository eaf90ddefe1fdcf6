//! Per-session state: the active index and the conversation so far.

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::index::IndexHandle;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ordered (question, answer) history of a session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing ingested yet.
    Empty,
    /// Index built, accepting questions.
    Ready,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) index: Option<IndexHandle>,
    pub(crate) conversation: ConversationState,
}

/// One user's ingestion and conversation lifecycle.
///
/// Every orchestrator call takes the session lock for its whole duration,
/// so calls against one session run one at a time. The id names the
/// session's own vector store, so sessions never share documents.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session with a fresh random id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// A session with a caller-chosen id, so a later process can
    /// [`resume`](crate::orchestrator::Orchestrator::resume) its store.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub async fn status(&self) -> SessionStatus {
        if self.state.lock().await.index.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::Empty
        }
    }

    /// Every answered question, oldest first.
    pub async fn history(&self) -> Vec<Turn> {
        self.state.lock().await.conversation.turns().to_vec()
    }

    /// The active index, if any.
    pub async fn index(&self) -> Option<IndexHandle> {
        self.state.lock().await.index.clone()
    }

    /// Drop the active index and history, returning to `Empty`.
    ///
    /// The persisted store is left on disk.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.index = None;
        state.conversation = ConversationState::default();
    }
}
