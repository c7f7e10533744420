use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use questline_core::ids::{PlayerId, SessionId};
use questline_core::quest::{Interaction, QuestType};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A finalized quest ready to be committed. Keyed by session id so a retried
/// finalization overwrites its own earlier partial write instead of
/// duplicating the record.
#[derive(Clone, Debug)]
pub struct NewQuestRecord<'a> {
    pub session_id: &'a SessionId,
    pub player_id: &'a PlayerId,
    pub quest_type: QuestType,
    pub interactions: &'a [Interaction],
    pub report: serde_json::Value,
    pub chronicle: &'a str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestRecordRow {
    pub id: String,
    pub player_id: PlayerId,
    pub quest_type: QuestType,
    pub interactions: Vec<Interaction>,
    pub report: serde_json::Value,
    pub chronicle: String,
    pub completed_at: String,
}

pub struct QuestRecordRepo {
    db: Database,
}

impl QuestRecordRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Commit a completion record (upsert-by-latest, see `NewQuestRecord`).
    #[instrument(skip(self, record), fields(session_id = %record.session_id, quest_type = %record.quest_type))]
    pub fn upsert(&self, record: &NewQuestRecord<'_>) -> Result<(), StoreError> {
        let interactions = serde_json::to_string(record.interactions)?;
        let report = serde_json::to_string(&record.report)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO quest_records
                     (id, player_id, quest_type, interactions, report, chronicle, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.session_id.as_str(),
                    record.player_id.as_str(),
                    record.quest_type.to_string(),
                    interactions,
                    report,
                    record.chronicle,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn get(&self, session_id: &SessionId) -> Result<QuestRecordRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, player_id, quest_type, interactions, report, chronicle, completed_at
                 FROM quest_records WHERE id = ?1",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row),
                None => Err(StoreError::NotFound(format!("quest record {session_id}"))),
            }
        })
    }

    /// Completion records for one player, newest first.
    #[instrument(skip(self), fields(player_id = %player_id))]
    pub fn list_for_player(
        &self,
        player_id: &PlayerId,
        limit: u32,
    ) -> Result<Vec<QuestRecordRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, player_id, quest_type, interactions, report, chronicle, completed_at
                 FROM quest_records WHERE player_id = ?1
                 ORDER BY completed_at DESC LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![player_id.as_str(), limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_record(row)?);
            }
            Ok(results)
        })
    }

    /// The most recent chronicle for a player, used to seed the next quest's
    /// opening narrative. None until the player has finished a quest.
    #[instrument(skip(self), fields(player_id = %player_id))]
    pub fn latest_chronicle(&self, player_id: &PlayerId) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chronicle FROM quest_records
                 WHERE player_id = ?1 AND chronicle != ''
                 ORDER BY completed_at DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([player_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_helpers::get(row, 0, "quest_records", "chronicle")?)),
                None => Ok(None),
            }
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<QuestRecordRow, StoreError> {
    let quest_type_raw: String = row_helpers::get(row, 2, "quest_records", "quest_type")?;
    let interactions_raw: String = row_helpers::get(row, 3, "quest_records", "interactions")?;
    let report_raw: String = row_helpers::get(row, 4, "quest_records", "report")?;

    Ok(QuestRecordRow {
        id: row_helpers::get(row, 0, "quest_records", "id")?,
        player_id: PlayerId::from_raw(row_helpers::get::<String>(row, 1, "quest_records", "player_id")?),
        quest_type: row_helpers::parse_enum(&quest_type_raw, "quest_records", "quest_type")?,
        interactions: row_helpers::parse_json(&interactions_raw, "quest_records", "interactions")?,
        report: row_helpers::parse_json(&report_raw, "quest_records", "report")?,
        chronicle: row_helpers::get(row, 5, "quest_records", "chronicle")?,
        completed_at: row_helpers::get(row, 6, "quest_records", "completed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::PlayerRepo;
    use questline_core::ids::QuestionId;
    use questline_core::quest::{Question, QuestionType};

    fn setup() -> (Database, PlayerId) {
        let db = Database::in_memory().unwrap();
        let player_id = PlayerId::new();
        PlayerRepo::new(db.clone()).get_or_create(&player_id).unwrap();
        (db, player_id)
    }

    fn interaction(n: u32) -> Interaction {
        Interaction {
            question: Question {
                id: QuestionId::from_raw(format!("q_{n}")),
                kind: QuestionType::Choice,
                text: format!("Question {n}"),
                options: None,
            },
            answer: "left".into(),
            question_type: QuestionType::Choice,
        }
    }

    #[test]
    fn upsert_and_get() {
        let (db, player_id) = setup();
        let repo = QuestRecordRepo::new(db);
        let session_id = SessionId::new();
        let interactions = vec![interaction(1), interaction(2)];

        repo.upsert(&NewQuestRecord {
            session_id: &session_id,
            player_id: &player_id,
            quest_type: QuestType::Mbti,
            interactions: &interactions,
            report: serde_json::json!({"quest_type": "mbti", "class_id": "CLS_INTJ"}),
            chronicle: "A careful strategist emerged.",
        })
        .unwrap();

        let record = repo.get(&session_id).unwrap();
        assert_eq!(record.quest_type, QuestType::Mbti);
        assert_eq!(record.interactions.len(), 2);
        assert_eq!(record.report["class_id"], "CLS_INTJ");
        assert_eq!(record.chronicle, "A careful strategist emerged.");
    }

    #[test]
    fn upsert_twice_keeps_latest() {
        let (db, player_id) = setup();
        let repo = QuestRecordRepo::new(db);
        let session_id = SessionId::new();

        for chronicle in ["first attempt", "second attempt"] {
            repo.upsert(&NewQuestRecord {
                session_id: &session_id,
                player_id: &player_id,
                quest_type: QuestType::Disc,
                interactions: &[],
                report: serde_json::json!({"quest_type": "disc"}),
                chronicle,
            })
            .unwrap();
        }

        let records = repo.list_for_player(&player_id, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chronicle, "second attempt");
    }

    #[test]
    fn latest_chronicle_skips_empty() {
        let (db, player_id) = setup();
        let repo = QuestRecordRepo::new(db);

        assert!(repo.latest_chronicle(&player_id).unwrap().is_none());

        repo.upsert(&NewQuestRecord {
            session_id: &SessionId::new(),
            player_id: &player_id,
            quest_type: QuestType::Mbti,
            interactions: &[],
            report: serde_json::json!({}),
            chronicle: "",
        })
        .unwrap();
        assert!(repo.latest_chronicle(&player_id).unwrap().is_none());

        repo.upsert(&NewQuestRecord {
            session_id: &SessionId::new(),
            player_id: &player_id,
            quest_type: QuestType::Gallup,
            interactions: &[],
            report: serde_json::json!({}),
            chronicle: "The journey left its mark.",
        })
        .unwrap();
        assert_eq!(
            repo.latest_chronicle(&player_id).unwrap().as_deref(),
            Some("The journey left its mark.")
        );
    }

    #[test]
    fn get_missing_record_fails() {
        let (db, _) = setup();
        let repo = QuestRecordRepo::new(db);
        assert!(matches!(
            repo.get(&SessionId::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_for_player_limits() {
        let (db, player_id) = setup();
        let repo = QuestRecordRepo::new(db);
        for _ in 0..3 {
            repo.upsert(&NewQuestRecord {
                session_id: &SessionId::new(),
                player_id: &player_id,
                quest_type: QuestType::Enneagram,
                interactions: &[],
                report: serde_json::json!({}),
                chronicle: "x",
            })
            .unwrap();
        }
        assert_eq!(repo.list_for_player(&player_id, 2).unwrap().len(), 2);
        assert_eq!(repo.list_for_player(&player_id, 10).unwrap().len(), 3);
    }

    #[test]
    fn corrupt_interactions_column_detected() {
        let (db, player_id) = setup();
        let session_id = SessionId::new();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO quest_records (id, player_id, quest_type, interactions, report, chronicle, completed_at)
                 VALUES (?1, ?2, 'mbti', 'not json', '{}', '', ?3)",
                rusqlite::params![session_id.as_str(), player_id.as_str(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .unwrap();

        let repo = QuestRecordRepo::new(db);
        assert!(matches!(
            repo.get(&session_id),
            Err(StoreError::CorruptRow { column: "interactions", .. })
        ));
    }
}
