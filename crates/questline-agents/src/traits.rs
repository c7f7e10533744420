//! Capability traits for the four opaque collaborators the orchestration core
//! depends on. The engine only ever talks to these traits; concrete backends
//! (HTTP, mocks) live alongside them in this crate.

use async_trait::async_trait;

use questline_core::errors::AgentError;
use questline_core::quest::{
    AggregateScore, AnalysisResult, ChronicleRequest, GenerationContext, Question, QuestType,
    ScoreRequest,
};
use questline_core::report::RawTransform;

/// One narrative step from the content generator. `completed` is the
/// generator's closure signal; when set (or when `question` is absent) the
/// controller moves the session toward completion instead of asking again.
#[derive(Clone, Debug)]
pub struct GeneratedStep {
    pub narrative: String,
    pub question: Option<Question>,
    pub guide_message: Option<String>,
    pub completed: bool,
}

/// Closing message for a finished quest.
#[derive(Clone, Debug)]
pub struct Completion {
    pub final_message: String,
}

/// Produces narrative, questions, and the closing message.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_question(&self, ctx: &GenerationContext)
        -> Result<GeneratedStep, AgentError>;

    async fn generate_completion(&self, ctx: &GenerationContext) -> Result<Completion, AgentError>;
}

/// Scores a single answer. Invoked from a detached background task per turn.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score_answer(&self, req: &ScoreRequest) -> Result<AnalysisResult, AgentError>;
}

/// Maps an aggregated score onto the quest-type-specific report fields.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        quest_type: QuestType,
        aggregate: &AggregateScore,
    ) -> Result<RawTransform, AgentError>;
}

/// Writes the short hero chronicle persisted with each completed quest and
/// replayed as context when the next quest opens.
#[async_trait]
pub trait Chronicler: Send + Sync {
    async fn chronicle(&self, req: &ChronicleRequest) -> Result<String, AgentError>;
}
