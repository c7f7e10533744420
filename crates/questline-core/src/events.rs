//! Wire protocol for the quiz WebSocket channel. Every message is a JSON
//! envelope `{"event": <name>, "data": {...}}`. Decoding happens exactly once
//! per inbound frame, here, into a typed event; malformed frames surface a
//! decode error instead of silently defaulting.

use serde::{Deserialize, Serialize};

use crate::leveling::Milestone;
use crate::quest::Question;
use crate::report::Report;

/// Inbound events from the client.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    StartQuest {
        #[serde(rename = "questId")]
        quest_id: String,
    },
    SubmitAnswer {
        answer: String,
        #[serde(rename = "questionIndex")]
        question_index: u32,
    },
    RequestResult {},
}

/// Outbound events to the client.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NextQuestion {
        narrative: String,
        question: Question,
        #[serde(rename = "guideMessage", skip_serializing_if = "Option::is_none")]
        guide_message: Option<String>,
        #[serde(rename = "questionIndex")]
        question_index: u32,
        #[serde(rename = "totalSteps")]
        total_steps: u32,
    },
    QuestComplete {
        message: String,
        #[serde(rename = "totalExp")]
        total_exp: u64,
    },
    FinalResult {
        #[serde(flatten)]
        report: Report,
        #[serde(rename = "levelInfo")]
        level_info: LevelInfo,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::NextQuestion { .. } => "next_question",
            Self::QuestComplete { .. } => "quest_complete",
            Self::FinalResult { .. } => "final_result",
            Self::Error { .. } => "error",
        }
    }
}

/// Level block attached to the final result and the persisted report.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: u32,
    pub exp: u64,
    pub exp_to_next_level: u64,
    pub exp_progress: f64,
    pub is_leveled_up: bool,
    pub earned_exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,
}

/// The single typed decode boundary for inbound frames.
pub fn decode_client_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(raw)
}
