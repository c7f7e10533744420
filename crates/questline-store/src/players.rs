use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use questline_core::ids::PlayerId;
use questline_core::leveling::LevelState;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const DEFAULT_DISPLAY_NAME: &str = "Adventurer";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRow {
    pub id: PlayerId,
    pub display_name: String,
    pub level: u32,
    pub total_exp: u64,
    pub hero_class_id: Option<String>,
    pub hero_avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PlayerRepo {
    db: Database,
}

impl PlayerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch a player, creating a fresh level-1 row on first sight. The quiz
    /// channel authenticates players minted elsewhere, so a missing row is
    /// not an error.
    #[instrument(skip(self), fields(player_id = %id))]
    pub fn get_or_create(&self, id: &PlayerId) -> Result<PlayerRow, StoreError> {
        match self.get(id) {
            Ok(row) => Ok(row),
            Err(StoreError::NotFound(_)) => self.create(id),
            Err(e) => Err(e),
        }
    }

    fn create(&self, id: &PlayerId) -> Result<PlayerRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO players (id, display_name, level, total_exp, created_at, updated_at)
                 VALUES (?1, ?2, 1, 0, ?3, ?3)",
                rusqlite::params![id.as_str(), DEFAULT_DISPLAY_NAME, now],
            )?;
            Ok(PlayerRow {
                id: id.clone(),
                display_name: DEFAULT_DISPLAY_NAME.to_string(),
                level: 1,
                total_exp: 0,
                hero_class_id: None,
                hero_avatar_url: None,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(player_id = %id))]
    pub fn get(&self, id: &PlayerId) -> Result<PlayerRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, level, total_exp, hero_class_id, hero_avatar_url,
                        created_at, updated_at
                 FROM players WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_player(row),
                None => Err(StoreError::NotFound(format!("player {id}"))),
            }
        })
    }

    pub fn set_display_name(&self, id: &PlayerId, display_name: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE players SET display_name = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![display_name, now, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Settle a quest's leveling outcome. Plain UPDATE, so a retried
    /// finalization lands on the same values. When the quest assigned a hero
    /// class, the class and its derived avatar path are stored too.
    #[instrument(skip(self), fields(player_id = %id, level = state.level, total_exp = state.total_exp))]
    pub fn apply_progress(
        &self,
        id: &PlayerId,
        state: LevelState,
        hero_class_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            match hero_class_id {
                Some(class_id) => {
                    let avatar = avatar_url(class_id);
                    conn.execute(
                        "UPDATE players SET level = ?1, total_exp = ?2, hero_class_id = ?3,
                                hero_avatar_url = ?4, updated_at = ?5
                         WHERE id = ?6",
                        rusqlite::params![
                            state.level,
                            state.total_exp as i64,
                            class_id,
                            avatar,
                            now,
                            id.as_str(),
                        ],
                    )?;
                }
                None => {
                    conn.execute(
                        "UPDATE players SET level = ?1, total_exp = ?2, updated_at = ?3
                         WHERE id = ?4",
                        rusqlite::params![state.level, state.total_exp as i64, now, id.as_str()],
                    )?;
                }
            }
            Ok(())
        })
    }
}

fn avatar_url(class_id: &str) -> String {
    format!("/assets/images/classes/{}.webp", class_id.to_lowercase())
}

fn row_to_player(row: &rusqlite::Row<'_>) -> Result<PlayerRow, StoreError> {
    Ok(PlayerRow {
        id: PlayerId::from_raw(row_helpers::get::<String>(row, 0, "players", "id")?),
        display_name: row_helpers::get(row, 1, "players", "display_name")?,
        level: row_helpers::get::<u32>(row, 2, "players", "level")?,
        total_exp: row_helpers::get::<i64>(row, 3, "players", "total_exp")? as u64,
        hero_class_id: row_helpers::get_opt(row, 4, "players", "hero_class_id")?,
        hero_avatar_url: row_helpers::get_opt(row, 5, "players", "hero_avatar_url")?,
        created_at: row_helpers::get(row, 6, "players", "created_at")?,
        updated_at: row_helpers::get(row, 7, "players", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, PlayerId) {
        (Database::in_memory().unwrap(), PlayerId::new())
    }

    #[test]
    fn get_or_create_makes_fresh_player() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        let player = repo.get_or_create(&id).unwrap();
        assert_eq!(player.level, 1);
        assert_eq!(player.total_exp, 0);
        assert_eq!(player.display_name, "Adventurer");
        assert!(player.hero_class_id.is_none());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        let first = repo.get_or_create(&id).unwrap();
        let second = repo.get_or_create(&id).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn get_missing_player_fails() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        assert!(matches!(repo.get(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn apply_progress_updates_level_and_exp() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        repo.get_or_create(&id).unwrap();

        repo.apply_progress(&id, LevelState::from_exp(1350), None).unwrap();
        let player = repo.get(&id).unwrap();
        assert_eq!(player.level, 5);
        assert_eq!(player.total_exp, 1350);
        assert!(player.hero_class_id.is_none());
    }

    #[test]
    fn apply_progress_with_class_sets_avatar() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        repo.get_or_create(&id).unwrap();

        repo.apply_progress(&id, LevelState::from_exp(1350), Some("CLS_INTJ"))
            .unwrap();
        let player = repo.get(&id).unwrap();
        assert_eq!(player.hero_class_id.as_deref(), Some("CLS_INTJ"));
        assert_eq!(
            player.hero_avatar_url.as_deref(),
            Some("/assets/images/classes/cls_intj.webp")
        );
    }

    #[test]
    fn apply_progress_is_repeatable() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        repo.get_or_create(&id).unwrap();

        let state = LevelState::from_exp(600);
        repo.apply_progress(&id, state, Some("CLS_ENFP")).unwrap();
        repo.apply_progress(&id, state, Some("CLS_ENFP")).unwrap();
        let player = repo.get(&id).unwrap();
        assert_eq!(player.total_exp, 600);
        assert_eq!(player.level, state.level);
    }

    #[test]
    fn set_display_name() {
        let (db, id) = setup();
        let repo = PlayerRepo::new(db);
        repo.get_or_create(&id).unwrap();
        repo.set_display_name(&id, "Rowan").unwrap();
        assert_eq!(repo.get(&id).unwrap().display_name, "Rowan");
    }
}
