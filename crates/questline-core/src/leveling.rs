//! Pure leveling arithmetic: cumulative experience, level thresholds, and the
//! quest parameters (question count, answer mode) derived from a level.
//!
//! Experience only ever accumulates. The level is always derived from the
//! running total and never stored as independent mutable truth.

use serde::{Deserialize, Serialize};

const BASE_EXP_PER_QUESTION: f64 = 100.0;
const COMPLETION_BONUS: u64 = 150;
const QUALITY_FLOOR: f64 = 1.0;
const QUALITY_CEILING: f64 = 1.2;

/// Cumulative EXP required to leave `level`. `exp_threshold(0)` is 0 so that
/// a fresh player sits at level 1 with zero experience.
///
/// `threshold(l) = 100 * l * (l + 1) / 2`
pub fn exp_threshold(level: u32) -> u64 {
    let l = level as u64;
    100 * l * (l + 1) / 2
}

/// Level for a cumulative EXP total: the largest level whose previous
/// threshold is within the total. Monotonic non-decreasing, always >= 1.
pub fn level_from_exp(total_exp: u64) -> u32 {
    let mut level = 1;
    while exp_threshold(level) <= total_exp {
        level += 1;
    }
    level
}

/// Total EXP earned by one completed quest. The quality multiplier is clamped
/// to [1.0, 1.2] before scaling, and a flat completion bonus is added.
pub fn quest_exp(num_questions: usize, avg_quality: f64) -> u64 {
    let multiplier = avg_quality.clamp(QUALITY_FLOOR, QUALITY_CEILING);
    (BASE_EXP_PER_QUESTION * num_questions as f64 * multiplier).round() as u64 + COMPLETION_BONUS
}

/// Questions per quest for a player level. Longer trials unlock at 16.
pub fn question_count_for_level(level: u32) -> u32 {
    if level >= 16 {
        15
    } else {
        10
    }
}

/// Answer mode for a player level. Open dialogue unlocks at 11; below that
/// every question is multiple choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestMode {
    ChoiceOnly,
    OpenDialogue,
}

impl QuestMode {
    pub fn allows_free_text(&self) -> bool {
        matches!(self, Self::OpenDialogue)
    }
}

pub fn quest_mode_for_level(level: u32) -> QuestMode {
    if level >= 11 {
        QuestMode::OpenDialogue
    } else {
        QuestMode::ChoiceOnly
    }
}

/// A player's leveling state. `level` is a cache of `level_from_exp(total_exp)`
/// and the two are kept consistent by constructing through `from_exp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelState {
    pub level: u32,
    pub total_exp: u64,
}

impl LevelState {
    pub fn from_exp(total_exp: u64) -> Self {
        Self {
            level: level_from_exp(total_exp),
            total_exp,
        }
    }
}

/// Position within the current level band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelProgress {
    pub current_threshold: u64,
    pub next_threshold: u64,
    pub progress: f64,
}

pub fn level_progress(total_exp: u64) -> LevelProgress {
    let level = level_from_exp(total_exp);
    let current_threshold = exp_threshold(level - 1);
    let next_threshold = exp_threshold(level);
    let span = (next_threshold - current_threshold) as f64;
    let progress = ((total_exp - current_threshold) as f64 / span).clamp(0.0, 1.0);
    LevelProgress {
        current_threshold,
        next_threshold,
        progress,
    }
}

/// Outcome of settling a quest's EXP against the player's prior level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUp {
    pub new_level: u32,
    pub new_total_exp: u64,
    pub leveled_up: bool,
}

/// Cumulative settlement: the total is never decremented, the new level is
/// derived from it.
pub fn check_level_up(old_level: u32, new_total_exp: u64) -> LevelUp {
    let new_level = level_from_exp(new_total_exp);
    LevelUp {
        new_level,
        new_total_exp,
        leveled_up: new_level > old_level,
    }
}

/// Feature unlock attached to reaching certain levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub level: u32,
    pub unlock: &'static str,
    pub message: &'static str,
}

pub fn milestone(level: u32) -> Option<Milestone> {
    match level {
        11 => Some(Milestone {
            level: 11,
            unlock: "Open dialogue",
            message: "Your voice has grown strong enough to answer in your own words.",
        }),
        16 => Some(Milestone {
            level: 16,
            unlock: "Extended trials",
            message: "You are ready for longer journeys: trials now run fifteen questions.",
        }),
        _ => None,
    }
}
