use questline_core::errors::AgentError;
use questline_core::ids::SessionId;
use questline_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no active quest for session {0}")]
    QuestNotActive(SessionId),

    #[error("session {0} already has a live connection")]
    DuplicateConnection(SessionId),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Fatal errors tear the connection down; the rest surface a single
    /// `error` event and leave the session alive for a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal(_))
    }
}
