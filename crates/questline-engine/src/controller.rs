//! Turn controller: drives the question/answer state machine for one session,
//! fans out background scoring per answer, and finalizes the quest behind the
//! aggregation barrier.
//!
//! Events for a single session arrive sequentially from its connection's read
//! loop; the scorer tasks spawned here are the only concurrency inside a
//! session's lifetime.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use questline_core::events::{LevelInfo, ServerEvent};
use questline_core::ids::{PlayerId, SessionId, SessionKey, TaskId};
use questline_core::leveling::{self, LevelState};
use questline_core::quest::{
    AggregateScore, ChronicleEntry, ChronicleRequest, GenerationContext, Interaction, QuestType,
    ScoreRequest,
};
use questline_agents::{Chronicler, ContentGenerator, Scorer, Transformer};
use questline_store::players::{PlayerRepo, PlayerRow};
use questline_store::quests::{NewQuestRecord, QuestRecordRepo};
use questline_store::Database;

use crate::error::EngineError;
use crate::registry::ConnectionRegistry;
use crate::session::{SessionHandle, SessionStore};

const DEFAULT_NAMESPACE: &str = "questline";

/// The four collaborator capabilities the controller orchestrates.
#[derive(Clone)]
pub struct AgentSet {
    pub generator: Arc<dyn ContentGenerator>,
    pub scorer: Arc<dyn Scorer>,
    pub transformer: Arc<dyn Transformer>,
    pub chronicler: Arc<dyn Chronicler>,
}

pub struct TurnController {
    sessions: Arc<SessionStore>,
    registry: Arc<ConnectionRegistry>,
    agents: AgentSet,
    db: Database,
    namespace: String,
}

impl TurnController {
    pub fn new(
        sessions: Arc<SessionStore>,
        registry: Arc<ConnectionRegistry>,
        agents: AgentSet,
        db: Database,
    ) -> Self {
        Self {
            sessions,
            registry,
            agents,
            db,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, player_id: &PlayerId, session_id: &SessionId) -> SessionKey {
        SessionKey::new(&self.namespace, player_id.clone(), session_id.clone())
    }

    fn player(&self, player_id: &PlayerId) -> Result<PlayerRow, EngineError> {
        Ok(PlayerRepo::new(self.db.clone()).get_or_create(player_id)?)
    }

    /// Arm a fresh quest: reset session state, derive the trial parameters
    /// from the player's level, and open with the first question.
    #[instrument(skip(self), fields(session_id = %session_id, player_id = %player_id, quest_id))]
    pub async fn start_quest(
        &self,
        player_id: &PlayerId,
        session_id: &SessionId,
        quest_id: &str,
    ) -> Result<(), EngineError> {
        let quest_type: QuestType = quest_id
            .parse()
            .map_err(|e: String| EngineError::Validation(e))?;

        let player = self.player(player_id)?;
        let total_steps = leveling::question_count_for_level(player.level);
        let mode = leveling::quest_mode_for_level(player.level);

        let session = self.sessions.get(&self.key(player_id, session_id));
        session.lock().reset_for(quest_type, total_steps, mode);

        // Prior chronicle seeds narrative continuity; losing it is not worth
        // failing the quest start.
        let chronicle = match QuestRecordRepo::new(self.db.clone()).latest_chronicle(player_id) {
            Ok(text) => text.unwrap_or_default(),
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "failed to load chronicle");
                String::new()
            }
        };

        let ctx = GenerationContext {
            player_name: player.display_name.clone(),
            player_level: player.level,
            quest_type,
            quest_mode: mode,
            total_steps,
            question_number: 1,
            chronicle,
            recent: Vec::new(),
            last_answer: None,
        };

        let step = self.agents.generator.generate_question(&ctx).await?;
        let question = step.question.ok_or_else(|| {
            EngineError::Agent(questline_core::errors::AgentError::InvalidResponse(
                "generator returned no opening question".into(),
            ))
        })?;

        session.lock().current_question = Some(question.clone());

        info!(quest_type = %quest_type, total_steps, "quest started");
        self.registry.send(
            session_id,
            &ServerEvent::NextQuestion {
                narrative: step.narrative,
                question,
                guide_message: step.guide_message,
                question_index: 0,
                total_steps,
            },
        );
        Ok(())
    }

    /// Record an answer, fan out its background scoring, and either ask the
    /// next question or close the quest. `question_index` is 0-based; the
    /// hard ceiling guarantees question `total_steps` is never requested.
    #[instrument(skip(self, answer), fields(session_id = %session_id, player_id = %player_id, question_index))]
    pub async fn submit_answer(
        &self,
        player_id: &PlayerId,
        session_id: &SessionId,
        answer: String,
        question_index: u32,
    ) -> Result<(), EngineError> {
        let player = self.player(player_id)?;
        let session = self.sessions.get(&self.key(player_id, session_id));

        let (quest_type, mode, total_steps, score_req, recent, answered) = {
            let mut state = session.lock();
            let quest_type = state
                .quest_type
                .ok_or_else(|| EngineError::QuestNotActive(session_id.clone()))?;
            if state.completed {
                return Err(EngineError::Validation("quest already completed".into()));
            }
            let question = state.current_question.take().ok_or_else(|| {
                EngineError::Validation("no question awaiting an answer".into())
            })?;
            let question_type = question.kind;
            let score_req = ScoreRequest {
                question_text: question.text.clone(),
                options: question.options.clone().unwrap_or_default(),
                answer: answer.clone(),
                category: quest_type,
                question_type,
            };
            state.interactions.push(Interaction {
                question,
                answer: answer.clone(),
                question_type,
            });
            let recent: Vec<Interaction> =
                state.interactions.iter().rev().take(2).rev().cloned().collect();
            let mode = state.quest_mode.unwrap_or(leveling::quest_mode_for_level(player.level));
            (
                quest_type,
                mode,
                state.total_steps,
                score_req,
                recent,
                state.interactions.len() as u32,
            )
        };

        // Fan-out: scoring runs outside the sequential event loop and must
        // never delay the next question.
        self.spawn_scorer(session_id, &session, score_req);

        let current_num = question_index + 1;
        let ctx = GenerationContext {
            player_name: player.display_name.clone(),
            player_level: player.level,
            quest_type,
            quest_mode: mode,
            total_steps,
            question_number: current_num + 1,
            chronicle: String::new(),
            recent,
            last_answer: Some(answer),
        };

        if current_num >= total_steps {
            // Hard ceiling: force closure regardless of generator discretion.
            return self.finish_quest(session_id, &session, &ctx, answered).await;
        }

        let step = self.agents.generator.generate_question(&ctx).await?;
        match step.question {
            Some(question) if !step.completed => {
                session.lock().current_question = Some(question.clone());
                self.registry.send(
                    session_id,
                    &ServerEvent::NextQuestion {
                        narrative: step.narrative,
                        question,
                        guide_message: step.guide_message,
                        question_index: current_num,
                        total_steps,
                    },
                );
                Ok(())
            }
            // The generator decided on narrative closure early.
            _ => self.finish_quest(session_id, &session, &ctx, answered).await,
        }
    }

    async fn finish_quest(
        &self,
        session_id: &SessionId,
        session: &SessionHandle,
        ctx: &GenerationContext,
        answered: u32,
    ) -> Result<(), EngineError> {
        let completion = self.agents.generator.generate_completion(ctx).await?;
        {
            let mut state = session.lock();
            state.completed = true;
            state.current_question = None;
            state.final_message = Some(completion.final_message.clone());
        }

        // Guaranteed floor; the settled figure arrives with final_result.
        let provisional = leveling::quest_exp(answered as usize, 1.0);
        info!(answered, "quest completed, awaiting result request");
        self.registry.send(
            session_id,
            &ServerEvent::QuestComplete {
                message: completion.final_message,
                total_exp: provisional,
            },
        );
        Ok(())
    }

    fn spawn_scorer(
        &self,
        session_id: &SessionId,
        session: &SessionHandle,
        req: ScoreRequest,
    ) {
        let task_id = TaskId::new();
        let scorer = Arc::clone(&self.agents.scorer);
        let registry = Arc::clone(&self.registry);
        let session = Arc::clone(session);
        let sid = session_id.clone();
        let tid = task_id.clone();

        let handle = tokio::spawn(async move {
            match scorer.score_answer(&req).await {
                Ok(result) => {
                    session.lock().accumulated_analytics.push(result);
                }
                Err(e) => {
                    warn!(
                        session_id = %sid,
                        kind = e.error_kind(),
                        error = %e,
                        "answer analysis failed, skipping result"
                    );
                }
            }
            registry.untrack_task(&sid, &tid);
        });

        self.registry.track_task(session_id, task_id, handle);
    }

    /// Finalize: join every outstanding scorer task, reduce the analytics,
    /// run the transformation pipeline, settle experience, persist, and send
    /// the final report. Only valid once the quest reached completion.
    #[instrument(skip(self), fields(session_id = %session_id, player_id = %player_id))]
    pub async fn request_result(
        &self,
        player_id: &PlayerId,
        session_id: &SessionId,
    ) -> Result<(), EngineError> {
        let player = self.player(player_id)?;
        let session = self.sessions.get(&self.key(player_id, session_id));

        let quest_type = {
            let state = session.lock();
            if !state.completed {
                return Err(EngineError::Validation(
                    "quest is not finished yet".into(),
                ));
            }
            state
                .quest_type
                .ok_or_else(|| EngineError::QuestNotActive(session_id.clone()))?
        };

        // Barrier: no analytics read happens until every tracked task landed.
        self.registry.join_pending(session_id).await;

        let (analytics, interactions) = {
            let state = session.lock();
            (state.accumulated_analytics.clone(), state.interactions.clone())
        };

        let aggregate = AggregateScore::from_analytics(&analytics);
        info!(
            quest_type = %quest_type,
            analyzed = analytics.len(),
            avg_quality = aggregate.avg_quality,
            "aggregated analysis"
        );

        let raw = self
            .agents
            .transformer
            .transform(quest_type, &aggregate)
            .await?;
        let (report, missing) = raw.into_report(quest_type);
        if !missing.is_empty() {
            // Contract violation is logged but non-fatal; the best-effort
            // report still goes out.
            warn!(
                quest_type = %quest_type,
                missing = ?missing,
                "transformation response missing required fields"
            );
        }

        let chronicle_req = ChronicleRequest {
            player_name: player.display_name.clone(),
            quest_type,
            entries: analytics
                .iter()
                .map(|r| ChronicleEntry {
                    reason: r.reason.clone(),
                    trait_deltas: r.trait_deltas.clone(),
                })
                .collect(),
        };
        let chronicle = match self.agents.chronicler.chronicle(&chronicle_req).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => default_chronicle(&player.display_name, quest_type),
            Err(e) => {
                warn!(error = %e, "chronicle generation failed, using fallback");
                default_chronicle(&player.display_name, quest_type)
            }
        };

        let earned = leveling::quest_exp(analytics.len(), aggregate.avg_quality);
        let new_total = player.total_exp + earned;
        let up = leveling::check_level_up(player.level, new_total);
        let progress = leveling::level_progress(new_total);
        let level_info = LevelInfo {
            level: up.new_level,
            exp: new_total,
            exp_to_next_level: progress.next_threshold,
            exp_progress: progress.progress,
            is_leveled_up: up.leveled_up,
            earned_exp: earned,
            milestone: if up.leveled_up {
                leveling::milestone(up.new_level)
            } else {
                None
            },
        };

        let mut report_json = serde_json::to_value(&report)
            .map_err(|e| EngineError::Internal(format!("report serialization: {e}")))?;
        report_json["levelInfo"] = serde_json::to_value(&level_info)
            .map_err(|e| EngineError::Internal(format!("level info serialization: {e}")))?;

        PlayerRepo::new(self.db.clone()).apply_progress(
            player_id,
            LevelState {
                level: up.new_level,
                total_exp: new_total,
            },
            report.hero_class_id(),
        )?;
        QuestRecordRepo::new(self.db.clone()).upsert(&NewQuestRecord {
            session_id,
            player_id,
            quest_type,
            interactions: &interactions,
            report: report_json,
            chronicle: &chronicle,
        })?;

        info!(
            earned_exp = earned,
            new_level = up.new_level,
            leveled_up = up.leveled_up,
            "quest finalized"
        );
        self.registry
            .send(session_id, &ServerEvent::FinalResult { report, level_info });
        Ok(())
    }
}

fn default_chronicle(display_name: &str, quest_type: QuestType) -> String {
    format!("{display_name} left their mark on the {quest_type} trial.")
}
