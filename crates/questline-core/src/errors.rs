use std::time::Duration;

/// Typed error hierarchy for collaborator agent calls (generator, scorer,
/// transformer, chronicler). A timeout is surfaced as its own variant so the
/// session loop can keep the connection alive for a retry.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),
    #[error("agent endpoint error {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("agent unreachable: {0}")]
    Unreachable(String),
    #[error("agent timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Endpoint { .. } => "endpoint_error",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code from the agent endpoint.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400..=499 => Self::InvalidResponse(format!("status {status}: {body}")),
            _ => Self::Endpoint { status, body },
        }
    }
}
