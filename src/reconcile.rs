use std::sync::Arc;

use serde_json::Value;

use crate::local_store::{KeyValueStore, load_cached_stats};
use crate::stats::{
    AchievementTier, StatsSnapshot, clamp_percent, count_field, real_field, round1,
};
use crate::stats_fetch::StatsSource;

/// Who we are reconciling for. Passed in per cycle; nothing in here is read
/// from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub user_id: String,
    pub credential: Option<String>,
}

impl SyncContext {
    pub fn new(user_id: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Remote,
    Cache,
    Defaults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub snapshot: StatsSnapshot,
    pub source: SnapshotSource,
    /// Why the remote answer wasn't used, when it wasn't.
    pub fallback_reason: Option<String>,
    /// Tier label the server sent that isn't one of ours. The snapshot then
    /// carries `Bingo Rookie`; the raw label is kept here for display.
    pub reported_tier_label: Option<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn StatsSource>,
    store: Arc<dyn KeyValueStore>,
}

impl Reconciler {
    pub fn new(source: Arc<dyn StatsSource>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { source, store }
    }

    /// Produces a snapshot for `ctx`. Never fails: remote problems fall back to
    /// the cached stats, and a missing or corrupt cache falls back to zeros.
    pub fn reconcile(&self, ctx: &SyncContext) -> Reconciled {
        match self.source.fetch_stats(ctx.credential.as_deref()) {
            Ok(Some(body)) => {
                tracing::debug!(user = %ctx.user_id, "using remote stats");
                Reconciled {
                    snapshot: snapshot_from_remote(&body),
                    source: SnapshotSource::Remote,
                    fallback_reason: None,
                    reported_tier_label: unrecognized_tier_label(&body),
                }
            }
            Ok(None) => {
                tracing::info!(user = %ctx.user_id, "remote stats body empty, using local cache");
                self.fallback(ctx, "remote returned no body".to_string())
            }
            Err(err) => {
                tracing::warn!(
                    user = %ctx.user_id,
                    kind = err.kind(),
                    error = %err,
                    "remote stats failed, using local cache"
                );
                self.fallback(ctx, err.to_string())
            }
        }
    }

    fn fallback(&self, ctx: &SyncContext, reason: String) -> Reconciled {
        match load_cached_stats(self.store.as_ref(), &ctx.user_id) {
            Ok(Some(cached)) => Reconciled {
                snapshot: StatsSnapshot::from_cached(&cached),
                source: SnapshotSource::Cache,
                fallback_reason: Some(reason),
                reported_tier_label: None,
            },
            Ok(None) => {
                tracing::debug!(user = %ctx.user_id, "no cached stats, using defaults");
                Reconciled {
                    snapshot: StatsSnapshot::default(),
                    source: SnapshotSource::Defaults,
                    fallback_reason: Some(reason),
                    reported_tier_label: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    user = %ctx.user_id,
                    kind = err.kind(),
                    error = %err,
                    "cached stats unusable, using defaults"
                );
                Reconciled {
                    snapshot: StatsSnapshot::default(),
                    source: SnapshotSource::Defaults,
                    fallback_reason: Some(format!("{reason}; {err}")),
                    reported_tier_label: None,
                }
            }
        }
    }
}

/// Remote fields win as-is; each missing or falsy field defaults on its own.
/// The win rate is taken from the body, never derived here.
pub fn snapshot_from_remote(body: &Value) -> StatsSnapshot {
    StatsSnapshot {
        games_played: count_field(body, "gamesPlayed"),
        games_won: count_field(body, "gamesWon"),
        games_lost: count_field(body, "gamesLost"),
        games_drawn: count_field(body, "gamesDrawn"),
        total_lines_completed: count_field(body, "totalLinesCompleted"),
        average_lines_per_game: real_field(body, "averageLinesPerGame"),
        win_rate: clamp_percent(round1(real_field(body, "winRate"))),
        achievement_level: remote_tier(body.get("achievementLevel")),
    }
}

/// The server's `achievementLevel` when it is present but not a known tier.
pub fn unrecognized_tier_label(body: &Value) -> Option<String> {
    let label = tier_label(body.get("achievementLevel"))?;
    AchievementTier::from_label(label)
        .is_none()
        .then(|| label.trim().to_string())
}

fn tier_label(raw: Option<&Value>) -> Option<&str> {
    raw.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn remote_tier(raw: Option<&Value>) -> AchievementTier {
    let Some(label) = tier_label(raw) else {
        return AchievementTier::Rookie;
    };
    AchievementTier::from_label(label).unwrap_or_else(|| {
        tracing::debug!(%label, "unknown achievement tier from server");
        AchievementTier::Rookie
    })
}
