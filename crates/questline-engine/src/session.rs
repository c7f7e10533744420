use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use questline_core::ids::SessionKey;
use questline_core::leveling::QuestMode;
use questline_core::quest::{AnalysisResult, Interaction, Question, QuestType};

/// Mutable per-session quiz state. The turn controller owns the question
/// cursor; background scorer tasks append to `accumulated_analytics`. Those
/// are the only two writers, and every access goes through the session mutex.
#[derive(Debug, Default)]
pub struct SessionState {
    pub quest_type: Option<QuestType>,
    pub quest_mode: Option<QuestMode>,
    pub total_steps: u32,
    /// The question currently awaiting an answer.
    pub current_question: Option<Question>,
    pub interactions: Vec<Interaction>,
    pub accumulated_analytics: Vec<AnalysisResult>,
    pub completed: bool,
    pub final_message: Option<String>,
}

impl SessionState {
    /// Wipe everything from a prior attempt and arm a new quest. A reconnect
    /// that reuses a session id starts from a clean slate.
    pub fn reset_for(&mut self, quest_type: QuestType, total_steps: u32, mode: QuestMode) {
        self.quest_type = Some(quest_type);
        self.quest_mode = Some(mode);
        self.total_steps = total_steps;
        self.current_question = None;
        self.interactions.clear();
        self.accumulated_analytics.clear();
        self.completed = false;
        self.final_message = None;
    }
}

pub type SessionHandle = Arc<Mutex<SessionState>>;

/// In-memory session store keyed by (namespace, player, session).
///
/// Reference semantics: `get` returns the live session object, auto-created
/// on first access. Mutations through the handle are immediately visible to
/// every other holder, with no write-back step; a scorer task that outlives
/// its connection keeps writing into the same object.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionKey, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SessionKey) -> SessionHandle {
        self.sessions
            .entry(key.clone())
            .or_default()
            .value()
            .clone()
    }

    pub fn remove(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.remove(key).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
