use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::events::SignalSource;
use crate::reconcile::{Reconciled, SnapshotSource};
use crate::stats::{Achievement, AchievementTier, StatsSnapshot, tier_of};

const MAX_LOGS: usize = 200;

/// What caused a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Poll,
    GameCompleted(SignalSource),
    ChannelRebound,
    Manual,
}

#[derive(Debug, Clone)]
pub enum SyncCommand {
    Refresh(Trigger),
    Shutdown,
}

/// One finished reconciliation. `seq` grows monotonically in issue order, so a
/// lower number finishing later is an out-of-order completion.
#[derive(Debug, Clone)]
pub struct StatsUpdate {
    pub seq: u64,
    pub trigger: Trigger,
    pub reconciled: Reconciled,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetStats(StatsUpdate),
    Log(String),
}

/// View-model the presentation side renders from.
#[derive(Debug, Clone)]
pub struct ProfileState {
    pub stats: Option<StatsSnapshot>,
    pub source: Option<SnapshotSource>,
    pub loading: bool,
    pub last_seq: Option<u64>,
    pub last_trigger: Option<Trigger>,
    pub synced_at: Option<DateTime<Utc>>,
    /// Server tier label outside the known table, from the latest snapshot.
    pub reported_tier_label: Option<String>,
    pub discard_stale: bool,
    pub stale_discarded: u64,
    pub logs: VecDeque<String>,
}

impl Default for ProfileState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProfileState {
    pub fn new(discard_stale: bool) -> Self {
        Self {
            stats: None,
            source: None,
            loading: true,
            last_seq: None,
            last_trigger: None,
            synced_at: None,
            reported_tier_label: None,
            discard_stale,
            stale_discarded: 0,
            logs: VecDeque::with_capacity(MAX_LOGS),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    /// Displayed tier. Derived from `games_won` alone; the snapshot's own
    /// `achievement_level` is not consulted.
    pub fn achievement(&self) -> Achievement {
        tier_of(self.stats.as_ref().map(|s| s.games_won).unwrap_or(0))
    }

    /// `(reported, derived)` when the snapshot's tier and the displayed tier
    /// disagree.
    pub fn tier_divergence(&self) -> Option<(AchievementTier, AchievementTier)> {
        let stats = self.stats.as_ref()?;
        let derived = tier_of(stats.games_won).tier;
        (stats.achievement_level != derived).then_some((stats.achievement_level, derived))
    }
}

pub fn apply_delta(state: &mut ProfileState, delta: Delta) {
    match delta {
        Delta::SetStats(update) => {
            if state.discard_stale
                && let Some(last) = state.last_seq
                && update.seq < last
            {
                state.stale_discarded += 1;
                tracing::debug!(seq = update.seq, last, "dropping out-of-order stats");
                state.push_log(format!(
                    "[INFO] Dropped stale stats #{} (showing #{last})",
                    update.seq
                ));
                return;
            }

            let StatsUpdate {
                seq,
                trigger,
                reconciled,
                finished_at,
            } = update;
            if let Some(reason) = reconciled.fallback_reason.as_deref() {
                state.push_log(format!(
                    "[WARN] Stats from {}: {reason}",
                    source_label(reconciled.source)
                ));
            }
            if let Some(label) = reconciled.reported_tier_label.as_deref() {
                state.push_log(format!("[INFO] Server reports unlisted tier \"{label}\""));
            }
            state.reported_tier_label = reconciled.reported_tier_label;
            state.stats = Some(reconciled.snapshot);
            state.source = Some(reconciled.source);
            state.loading = false;
            state.last_seq = Some(seq);
            state.last_trigger = Some(trigger);
            state.synced_at = Some(finished_at);

            if let Some((reported, derived)) = state.tier_divergence() {
                tracing::debug!(
                    reported = reported.label(),
                    derived = derived.label(),
                    "reported tier differs from win-count tier"
                );
            }
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}

pub fn source_label(source: SnapshotSource) -> &'static str {
    match source {
        SnapshotSource::Remote => "remote",
        SnapshotSource::Cache => "local cache",
        SnapshotSource::Defaults => "defaults",
    }
}

pub fn trigger_label(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Startup => "startup",
        Trigger::Poll => "poll",
        Trigger::GameCompleted(SignalSource::Channel) => "game completed (channel)",
        Trigger::GameCompleted(SignalSource::Broadcast) => "game completed (broadcast)",
        Trigger::ChannelRebound => "channel rebound",
        Trigger::Manual => "manual",
    }
}
