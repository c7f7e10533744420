//! HTTP backend for the collaborator traits. Talks to an external agent
//! service exposing one JSON endpoint per capability:
//!
//!   POST {base}/questionnaire   -> { narrative, question?, guide_message?, completed? }
//!   POST {base}/completion      -> { final_message }
//!   POST {base}/analysis        -> { quality_score, trait_deltas, reason? }
//!   POST {base}/transformation  -> RawTransform fields
//!   POST {base}/summary         -> { hero_chronicle }

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use questline_core::errors::AgentError;
use questline_core::quest::{
    AggregateScore, AnalysisResult, ChronicleRequest, GenerationContext, Question, QuestType,
    ScoreRequest,
};
use questline_core::report::RawTransform;

use crate::traits::{Chronicler, Completion, ContentGenerator, GeneratedStep, Scorer, Transformer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpAgents {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpAgents {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, AgentError> {
        let mut req = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.header("authorization", format!("Bearer {}", key.expose_secret()));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AgentError::Unreachable(e.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status, body));
        }

        resp.json::<R>()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }
}

#[derive(Serialize)]
struct ContextBody<'a> {
    context: &'a GenerationContext,
}

#[derive(Deserialize)]
struct QuestionnaireResponse {
    #[serde(default)]
    narrative: String,
    question: Option<Question>,
    #[serde(default)]
    guide_message: Option<String>,
    #[serde(default)]
    completed: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    final_message: String,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    quality_score: f64,
    #[serde(default)]
    trait_deltas: std::collections::BTreeMap<String, f64>,
    #[serde(default)]
    reason: String,
}

#[derive(Serialize)]
struct TransformationBody<'a> {
    quest_type: QuestType,
    aggregate: &'a AggregateScore,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    hero_chronicle: String,
}

#[async_trait]
impl ContentGenerator for HttpAgents {
    async fn generate_question(
        &self,
        ctx: &GenerationContext,
    ) -> Result<GeneratedStep, AgentError> {
        let resp: QuestionnaireResponse =
            self.post("/questionnaire", &ContextBody { context: ctx }).await?;
        Ok(GeneratedStep {
            narrative: resp.narrative,
            question: resp.question,
            guide_message: resp.guide_message,
            completed: resp.completed,
        })
    }

    async fn generate_completion(&self, ctx: &GenerationContext) -> Result<Completion, AgentError> {
        let resp: CompletionResponse =
            self.post("/completion", &ContextBody { context: ctx }).await?;
        Ok(Completion {
            final_message: resp.final_message,
        })
    }
}

#[async_trait]
impl Scorer for HttpAgents {
    async fn score_answer(&self, req: &ScoreRequest) -> Result<AnalysisResult, AgentError> {
        let resp: AnalysisResponse = self.post("/analysis", req).await?;
        // Clamped into [1.0, 2.0] at the boundary.
        Ok(AnalysisResult::new(
            resp.quality_score,
            resp.trait_deltas,
            resp.reason,
        ))
    }
}

#[async_trait]
impl Transformer for HttpAgents {
    async fn transform(
        &self,
        quest_type: QuestType,
        aggregate: &AggregateScore,
    ) -> Result<RawTransform, AgentError> {
        self.post(
            "/transformation",
            &TransformationBody {
                quest_type,
                aggregate,
            },
        )
        .await
    }
}

#[async_trait]
impl Chronicler for HttpAgents {
    async fn chronicle(&self, req: &ChronicleRequest) -> Result<String, AgentError> {
        let resp: SummaryResponse = self.post("/summary", req).await?;
        Ok(resp.hero_chronicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let agents = HttpAgents::new("http://localhost:8700/", None);
        assert_eq!(agents.base_url, "http://localhost:8700");
    }

    #[test]
    fn questionnaire_response_defaults() {
        let resp: QuestionnaireResponse =
            serde_json::from_str(r#"{"narrative":"The mist parts."}"#).unwrap();
        assert_eq!(resp.narrative, "The mist parts.");
        assert!(resp.question.is_none());
        assert!(!resp.completed);
    }

    #[test]
    fn questionnaire_response_with_question() {
        let resp: QuestionnaireResponse = serde_json::from_str(
            r#"{
                "narrative": "n",
                "question": {"id": "q_1", "type": "CHOICE", "text": "Pick",
                             "options": [{"id": "a", "text": "One"}]},
                "guide_message": "hint",
                "completed": false
            }"#,
        )
        .unwrap();
        let q = resp.question.unwrap();
        assert_eq!(q.text, "Pick");
        assert_eq!(resp.guide_message.as_deref(), Some("hint"));
    }

    #[test]
    fn analysis_response_clamped_on_entry() {
        let resp: AnalysisResponse =
            serde_json::from_str(r#"{"quality_score": 3.4, "trait_deltas": {"E": 0.2}}"#).unwrap();
        let result = AnalysisResult::new(resp.quality_score, resp.trait_deltas, resp.reason);
        assert_eq!(result.quality_score, 2.0);
        assert_eq!(result.trait_deltas["E"], 0.2);
    }

    #[test]
    fn transformation_body_shape() {
        let agg = AggregateScore::from_analytics(&[]);
        let body = TransformationBody {
            quest_type: QuestType::BigFive,
            aggregate: &agg,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["quest_type"], "bigfive");
        assert_eq!(json["aggregate"]["avg_quality"], 1.0);
    }

    #[test]
    fn summary_response_default_empty() {
        let resp: SummaryResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.hero_chronicle.is_empty());
    }
}
