/// SQL DDL for the questline database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    total_exp INTEGER NOT NULL DEFAULT 0,
    hero_class_id TEXT,
    hero_avatar_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS quest_records (
    id TEXT PRIMARY KEY,
    player_id TEXT NOT NULL REFERENCES players(id),
    quest_type TEXT NOT NULL,
    interactions TEXT NOT NULL,
    report TEXT NOT NULL,
    chronicle TEXT NOT NULL,
    completed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quest_records_player ON quest_records(player_id);
CREATE INDEX IF NOT EXISTS idx_quest_records_player_completed
    ON quest_records(player_id, completed_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
