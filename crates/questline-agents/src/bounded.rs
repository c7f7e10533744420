use std::time::Duration;

use async_trait::async_trait;

use questline_core::errors::AgentError;
use questline_core::quest::{
    AggregateScore, AnalysisResult, ChronicleRequest, GenerationContext, QuestType, ScoreRequest,
};
use questline_core::report::RawTransform;

use crate::traits::{Chronicler, Completion, ContentGenerator, GeneratedStep, Scorer, Transformer};

/// Wraps any collaborator with a hard deadline. A call that exceeds the
/// deadline resolves to `AgentError::Timeout` instead of hanging the caller —
/// in particular the aggregation barrier must never wait on an unbounded
/// collaborator.
pub struct Bounded<A> {
    inner: A,
    timeout: Duration,
}

impl<A> Bounded<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AgentError>> + Send,
    ) -> Result<T, AgentError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl<A: ContentGenerator> ContentGenerator for Bounded<A> {
    async fn generate_question(
        &self,
        ctx: &GenerationContext,
    ) -> Result<GeneratedStep, AgentError> {
        self.deadline(self.inner.generate_question(ctx)).await
    }

    async fn generate_completion(&self, ctx: &GenerationContext) -> Result<Completion, AgentError> {
        self.deadline(self.inner.generate_completion(ctx)).await
    }
}

#[async_trait]
impl<A: Scorer> Scorer for Bounded<A> {
    async fn score_answer(&self, req: &ScoreRequest) -> Result<AnalysisResult, AgentError> {
        self.deadline(self.inner.score_answer(req)).await
    }
}

#[async_trait]
impl<A: Transformer> Transformer for Bounded<A> {
    async fn transform(
        &self,
        quest_type: QuestType,
        aggregate: &AggregateScore,
    ) -> Result<RawTransform, AgentError> {
        self.deadline(self.inner.transform(quest_type, aggregate)).await
    }
}

#[async_trait]
impl<A: Chronicler> Chronicler for Bounded<A> {
    async fn chronicle(&self, req: &ChronicleRequest) -> Result<String, AgentError> {
        self.deadline(self.inner.chronicle(req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChronicler, MockScorer};
    use questline_core::quest::QuestionType;

    fn score_request() -> ScoreRequest {
        ScoreRequest {
            question_text: "Pick".into(),
            options: vec![],
            answer: "A".into(),
            category: QuestType::Mbti,
            question_type: QuestionType::Choice,
        }
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let scorer = Bounded::new(MockScorer::uniform(1.5), Duration::from_secs(5));
        let result = scorer.score_answer(&score_request()).await.unwrap();
        assert_eq!(result.quality_score, 1.5);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        tokio::time::pause();
        let scorer = Bounded::new(
            MockScorer::uniform(1.5).with_delay(Duration::from_secs(60)),
            Duration::from_secs(5),
        );
        let binding = score_request();
        let fut = scorer.score_answer(&binding);
        tokio::pin!(fut);
        tokio::time::advance(Duration::from_secs(6)).await;
        let err = fut.await.err().expect("expected timeout");
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn inner_error_preserved() {
        let chronicler = Bounded::new(
            MockChronicler::failing(AgentError::Unreachable("down".into())),
            Duration::from_secs(5),
        );
        let req = ChronicleRequest {
            player_name: "Ash".into(),
            quest_type: QuestType::Disc,
            entries: vec![],
        };
        let err = chronicler.chronicle(&req).await.err().unwrap();
        assert!(matches!(err, AgentError::Unreachable(_)));
    }
}
