use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::QuestionId;
use crate::leveling::QuestMode;

/// The personality trials a player can undertake. Each maps to its own report
/// shape (see `report::Report`).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestType {
    Mbti,
    #[serde(rename = "bigfive")]
    BigFive,
    Disc,
    Enneagram,
    Gallup,
}

impl fmt::Display for QuestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mbti => "mbti",
            Self::BigFive => "bigfive",
            Self::Disc => "disc",
            Self::Enneagram => "enneagram",
            Self::Gallup => "gallup",
        };
        f.write_str(s)
    }
}

impl FromStr for QuestType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mbti" => Ok(Self::Mbti),
            "bigfive" | "big_five" => Ok(Self::BigFive),
            "disc" => Ok(Self::Disc),
            "enneagram" => Ok(Self::Enneagram),
            "gallup" => Ok(Self::Gallup),
            other => Err(format!("unknown quest type: {other}")),
        }
    }
}

/// How a question expects to be answered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Choice,
    OpenText,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<AnswerOption>>,
}

/// One answered question. Appended once per turn, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub question: Question,
    pub answer: String,
    pub question_type: QuestionType,
}

/// Output of one background scoring pass over a single answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub quality_score: f64,
    pub trait_deltas: BTreeMap<String, f64>,
    pub reason: String,
}

impl AnalysisResult {
    /// Quality scores live in [1.0, 2.0]; anything outside is clamped at the
    /// boundary where the result enters the system.
    pub fn new(
        quality_score: f64,
        trait_deltas: BTreeMap<String, f64>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            quality_score: quality_score.clamp(1.0, 2.0),
            trait_deltas,
            reason: reason.into(),
        }
    }
}

/// Deterministic reduction over accumulated analysis results. Summation and
/// averaging only, so the outcome is independent of completion order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateScore {
    pub avg_quality: f64,
    pub trait_sums: BTreeMap<String, f64>,
}

impl AggregateScore {
    pub fn from_analytics(analytics: &[AnalysisResult]) -> Self {
        let avg_quality = if analytics.is_empty() {
            1.0
        } else {
            analytics.iter().map(|r| r.quality_score).sum::<f64>() / analytics.len() as f64
        };

        let mut trait_sums: BTreeMap<String, f64> = BTreeMap::new();
        for result in analytics {
            for (tag, delta) in &result.trait_deltas {
                *trait_sums.entry(tag.clone()).or_insert(0.0) += delta;
            }
        }

        Self {
            avg_quality,
            trait_sums,
        }
    }
}

/// Everything the content generator needs to produce the next narrative step.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationContext {
    pub player_name: String,
    pub player_level: u32,
    pub quest_type: QuestType,
    pub quest_mode: QuestMode,
    pub total_steps: u32,
    /// 1-based number of the question being requested.
    pub question_number: u32,
    pub chronicle: String,
    /// Last couple of answered questions, for narrative continuity.
    pub recent: Vec<Interaction>,
    pub last_answer: Option<String>,
}

/// Input for one background scoring pass.
#[derive(Clone, Debug, Serialize)]
pub struct ScoreRequest {
    pub question_text: String,
    pub options: Vec<AnswerOption>,
    pub answer: String,
    pub category: QuestType,
    pub question_type: QuestionType,
}

/// Input for the end-of-quest chronicle summary.
#[derive(Clone, Debug, Serialize)]
pub struct ChronicleRequest {
    pub player_name: String,
    pub quest_type: QuestType,
    pub entries: Vec<ChronicleEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChronicleEntry {
    pub reason: String,
    pub trait_deltas: BTreeMap<String, f64>,
}
