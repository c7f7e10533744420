//! Scripted collaborators for deterministic tests without a live agent
//! backend.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use questline_core::errors::AgentError;
use questline_core::ids::QuestionId;
use questline_core::quest::{
    AggregateScore, AnalysisResult, AnswerOption, ChronicleRequest, GenerationContext, Question,
    QuestType, QuestionType, ScoreRequest,
};
use questline_core::report::RawTransform;

use crate::traits::{Chronicler, Completion, ContentGenerator, GeneratedStep, Scorer, Transformer};

/// A scripted generator turn.
pub enum MockStep {
    Step(GeneratedStep),
    Error(AgentError),
    Delayed(Duration, Box<MockStep>),
}

/// Build a plain choice-question step, numbered for traceability in tests.
pub fn question_step(number: u32) -> GeneratedStep {
    GeneratedStep {
        narrative: format!("The path forks at marker {number}."),
        question: Some(Question {
            id: QuestionId::from_raw(format!("q_{number}")),
            kind: QuestionType::Choice,
            text: format!("Question {number}: which way?"),
            options: Some(vec![
                AnswerOption { id: "a".into(), text: "Left".into() },
                AnswerOption { id: "b".into(), text: "Right".into() },
            ]),
        }),
        guide_message: None,
        completed: false,
    }
}

/// Generator that replays a script and signals closure once it runs dry.
pub struct MockGenerator {
    steps: Mutex<VecDeque<MockStep>>,
    final_message: String,
    question_calls: AtomicUsize,
    completion_calls: AtomicUsize,
}

impl MockGenerator {
    pub fn scripted(steps: Vec<MockStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            final_message: "Your trial is complete.".into(),
            question_calls: AtomicUsize::new(0),
            completion_calls: AtomicUsize::new(0),
        }
    }

    /// `count` question steps, then closure.
    pub fn with_questions(count: u32) -> Self {
        Self::scripted((1..=count).map(|n| MockStep::Step(question_step(n))).collect())
    }

    pub fn question_calls(&self) -> usize {
        self.question_calls.load(Ordering::Relaxed)
    }

    pub fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::Relaxed)
    }

    fn closure_step() -> GeneratedStep {
        GeneratedStep {
            narrative: "The trial draws to a close.".into(),
            question: None,
            guide_message: None,
            completed: true,
        }
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate_question(
        &self,
        _ctx: &GenerationContext,
    ) -> Result<GeneratedStep, AgentError> {
        self.question_calls.fetch_add(1, Ordering::Relaxed);
        let mut next = match self.steps.lock().pop_front() {
            Some(step) => step,
            None => return Ok(Self::closure_step()),
        };
        loop {
            match next {
                MockStep::Step(step) => return Ok(step),
                MockStep::Error(e) => return Err(e),
                MockStep::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    next = *inner;
                }
            }
        }
    }

    async fn generate_completion(&self, _ctx: &GenerationContext) -> Result<Completion, AgentError> {
        self.completion_calls.fetch_add(1, Ordering::Relaxed);
        Ok(Completion {
            final_message: self.final_message.clone(),
        })
    }
}

/// A scripted scorer turn.
pub enum MockScore {
    Result(AnalysisResult),
    Error(AgentError),
}

/// Scorer with an optional artificial delay, falling back to a uniform
/// quality score when the script is exhausted.
pub struct MockScorer {
    script: Mutex<VecDeque<MockScore>>,
    fallback_quality: f64,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockScorer {
    pub fn uniform(quality: f64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_quality: quality,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scripted(script: Vec<MockScore>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback_quality: 1.0,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score_answer(&self, req: &ScoreRequest) -> Result<AnalysisResult, AgentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().pop_front() {
            Some(MockScore::Result(result)) => Ok(result),
            Some(MockScore::Error(e)) => Err(e),
            None => {
                let mut deltas = BTreeMap::new();
                deltas.insert(req.category.to_string(), 0.5);
                Ok(AnalysisResult::new(
                    self.fallback_quality,
                    deltas,
                    format!("scripted analysis of '{}'", req.answer),
                ))
            }
        }
    }
}

/// Transformer replaying a script, else a fixed response.
pub struct MockTransformer {
    script: Mutex<VecDeque<Result<RawTransform, AgentError>>>,
    default: RawTransform,
    calls: AtomicUsize,
}

impl MockTransformer {
    pub fn returning(default: RawTransform) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scripted(script: Vec<Result<RawTransform, AgentError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default: RawTransform::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    async fn transform(
        &self,
        _quest_type: QuestType,
        _aggregate: &AggregateScore,
    ) -> Result<RawTransform, AgentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.default.clone()),
        }
    }
}

/// Chronicler returning a fixed line (or failure).
pub struct MockChronicler {
    script: Mutex<VecDeque<Result<String, AgentError>>>,
    default: String,
}

impl MockChronicler {
    pub fn saying(line: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: line.into(),
        }
    }

    pub fn failing(error: AgentError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(error)])),
            default: String::new(),
        }
    }
}

#[async_trait]
impl Chronicler for MockChronicler {
    async fn chronicle(&self, _req: &ChronicleRequest) -> Result<String, AgentError> {
        match self.script.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.default.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GenerationContext {
        GenerationContext {
            player_name: "Ash".into(),
            player_level: 1,
            quest_type: QuestType::Mbti,
            quest_mode: questline_core::leveling::QuestMode::ChoiceOnly,
            total_steps: 10,
            question_number: 1,
            chronicle: String::new(),
            recent: vec![],
            last_answer: None,
        }
    }

    fn score_req() -> ScoreRequest {
        ScoreRequest {
            question_text: "q".into(),
            options: vec![],
            answer: "a".into(),
            category: QuestType::Mbti,
            question_type: QuestionType::Choice,
        }
    }

    #[tokio::test]
    async fn generator_replays_script_then_closes() {
        let gen = MockGenerator::with_questions(2);
        let first = gen.generate_question(&ctx()).await.unwrap();
        assert!(!first.completed);
        assert!(first.question.is_some());

        let second = gen.generate_question(&ctx()).await.unwrap();
        assert_eq!(second.question.unwrap().text, "Question 2: which way?");

        let third = gen.generate_question(&ctx()).await.unwrap();
        assert!(third.completed);
        assert!(third.question.is_none());
        assert_eq!(gen.question_calls(), 3);
    }

    #[tokio::test]
    async fn generator_completion_message() {
        let gen = MockGenerator::with_questions(1);
        let completion = gen.generate_completion(&ctx()).await.unwrap();
        assert_eq!(completion.final_message, "Your trial is complete.");
        assert_eq!(gen.completion_calls(), 1);
    }

    #[tokio::test]
    async fn generator_scripted_error() {
        let gen = MockGenerator::scripted(vec![MockStep::Error(AgentError::Cancelled)]);
        assert!(gen.generate_question(&ctx()).await.is_err());
    }

    #[tokio::test]
    async fn scorer_uniform_quality_and_deltas() {
        let scorer = MockScorer::uniform(1.5);
        let result = scorer.score_answer(&score_req()).await.unwrap();
        assert_eq!(result.quality_score, 1.5);
        assert_eq!(result.trait_deltas["mbti"], 0.5);
        assert_eq!(scorer.call_count(), 1);
    }

    #[tokio::test]
    async fn scorer_script_takes_precedence() {
        let scripted = AnalysisResult::new(1.9, BTreeMap::new(), "scripted");
        let scorer = MockScorer::scripted(vec![MockScore::Result(scripted.clone())]);
        let first = scorer.score_answer(&score_req()).await.unwrap();
        assert_eq!(first, scripted);
        // Script exhausted: falls back to the uniform result.
        let second = scorer.score_answer(&score_req()).await.unwrap();
        assert_eq!(second.quality_score, 1.0);
    }

    #[tokio::test]
    async fn scorer_delay_is_applied() {
        tokio::time::pause();
        let scorer = MockScorer::uniform(1.0).with_delay(Duration::from_millis(500));
        let binding = score_req();
        let fut = scorer.score_answer(&binding);
        tokio::pin!(fut);
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(fut.await.is_ok());
    }

    #[tokio::test]
    async fn transformer_default_and_script() {
        let raw = RawTransform {
            stance_id: Some("STN_S".into()),
            ..Default::default()
        };
        let transformer = MockTransformer::returning(raw.clone());
        let agg = AggregateScore::from_analytics(&[]);
        let out = transformer.transform(QuestType::Disc, &agg).await.unwrap();
        assert_eq!(out, raw);
        assert_eq!(transformer.call_count(), 1);

        let failing = MockTransformer::scripted(vec![Err(AgentError::Cancelled)]);
        assert!(failing.transform(QuestType::Disc, &agg).await.is_err());
    }

    #[tokio::test]
    async fn chronicler_line_and_failure() {
        let ok = MockChronicler::saying("A quiet hero passed this way.");
        let req = ChronicleRequest {
            player_name: "Ash".into(),
            quest_type: QuestType::Mbti,
            entries: vec![],
        };
        assert_eq!(ok.chronicle(&req).await.unwrap(), "A quiet hero passed this way.");

        let bad = MockChronicler::failing(AgentError::Unreachable("down".into()));
        assert!(bad.chronicle(&req).await.is_err());
    }
}
