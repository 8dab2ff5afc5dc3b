use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Canonical statistics handed to the presentation side. Replaced wholesale on
/// every reconciliation, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub games_drawn: u64,
    pub total_lines_completed: u64,
    pub average_lines_per_game: f64,
    /// Percentage in [0, 100], one decimal.
    pub win_rate: f64,
    pub achievement_level: AchievementTier,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            games_played: 0,
            games_won: 0,
            games_lost: 0,
            games_drawn: 0,
            total_lines_completed: 0,
            average_lines_per_game: 0.0,
            win_rate: 0.0,
            achievement_level: AchievementTier::Rookie,
        }
    }
}

impl StatsSnapshot {
    pub fn win_rate_label(&self) -> String {
        format!("{:.1}", self.win_rate)
    }

    /// Builds the snapshot used when the remote source gave us nothing. The tier
    /// is always the lowest one here; only the server hands out higher tiers.
    pub fn from_cached(cached: &CachedStats) -> Self {
        Self {
            games_played: cached.games_played,
            games_won: cached.games_won,
            games_lost: cached.games_lost,
            games_drawn: cached.games_drawn,
            total_lines_completed: cached.total_lines_completed,
            average_lines_per_game: cached.average_lines_per_game,
            win_rate: win_rate(cached.games_won, cached.games_played),
            achievement_level: AchievementTier::Rookie,
        }
    }
}

/// Per-user subset persisted by game-play code. Derived fields are absent on
/// purpose and recomputed on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachedStats {
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub games_drawn: u64,
    pub total_lines_completed: u64,
    pub average_lines_per_game: f64,
}

impl CachedStats {
    /// Reads a stored payload. Individual fields are parsed leniently (missing,
    /// null or junk become zero); only a payload that is not a JSON object at
    /// all counts as malformed.
    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        let root: Value = serde_json::from_str(raw.trim())
            .map_err(|err| SyncError::MalformedCachePayload(err.to_string()))?;
        if !root.is_object() {
            return Err(SyncError::MalformedCachePayload(format!(
                "expected object, found {}",
                json_type_name(&root)
            )));
        }
        Ok(Self {
            games_played: count_field(&root, "gamesPlayed"),
            games_won: count_field(&root, "gamesWon"),
            games_lost: count_field(&root, "gamesLost"),
            games_drawn: count_field(&root, "gamesDrawn"),
            total_lines_completed: count_field(&root, "totalLinesCompleted"),
            average_lines_per_game: real_field(&root, "averageLinesPerGame"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AchievementTier {
    #[serde(rename = "Bingo Rookie")]
    Rookie,
    #[serde(rename = "Bingo Player")]
    Player,
    #[serde(rename = "Bingo Pro")]
    Pro,
    #[serde(rename = "Bingo Expert")]
    Expert,
    #[serde(rename = "Bingo Master")]
    Master,
}

impl AchievementTier {
    pub fn label(self) -> &'static str {
        match self {
            AchievementTier::Rookie => "Bingo Rookie",
            AchievementTier::Player => "Bingo Player",
            AchievementTier::Pro => "Bingo Pro",
            AchievementTier::Expert => "Bingo Expert",
            AchievementTier::Master => "Bingo Master",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let cleaned = raw.trim();
        [
            AchievementTier::Master,
            AchievementTier::Expert,
            AchievementTier::Pro,
            AchievementTier::Player,
            AchievementTier::Rookie,
        ]
        .into_iter()
        .find(|tier| tier.label().eq_ignore_ascii_case(cleaned))
    }
}

/// Presentation hint paired with a tier. Theming it is the renderer's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHint {
    Crown,
    Trophy,
    GoldMedal,
    SilverMedal,
    BronzeMedal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Achievement {
    pub tier: AchievementTier,
    pub hint: TierHint,
}

// Highest threshold first; the first match wins.
const TIER_THRESHOLDS: [(u64, AchievementTier, TierHint); 5] = [
    (100, AchievementTier::Master, TierHint::Crown),
    (50, AchievementTier::Expert, TierHint::Trophy),
    (25, AchievementTier::Pro, TierHint::GoldMedal),
    (10, AchievementTier::Player, TierHint::SilverMedal),
    (0, AchievementTier::Rookie, TierHint::BronzeMedal),
];

pub fn tier_of(games_won: u64) -> Achievement {
    let lowest = TIER_THRESHOLDS[TIER_THRESHOLDS.len() - 1];
    let (_, tier, hint) = TIER_THRESHOLDS
        .into_iter()
        .find(|(threshold, _, _)| games_won >= *threshold)
        .unwrap_or(lowest);
    Achievement { tier, hint }
}

/// `won / played * 100`, rounded to one decimal and clamped to [0, 100].
pub fn win_rate(games_won: u64, games_played: u64) -> f64 {
    if games_played == 0 {
        return 0.0;
    }
    let pct = games_won as f64 / games_played as f64 * 100.0;
    clamp_percent(round1(pct))
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Non-negative integer field. Accepts numbers and numeric strings; anything
/// else (missing, null, negative, junk) reads as zero.
pub(crate) fn count_field(obj: &Value, key: &str) -> u64 {
    let raw = match obj.get(key) {
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                return v;
            }
            n.as_f64()
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

/// Non-negative real field with the same leniency as [`count_field`].
pub(crate) fn real_field(obj: &Value, key: &str) -> f64 {
    let raw = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
