//! Incremental vs. full sync decision
//!
//! [`SyncPlanner::plan`] is a pure function of the persisted [`SyncState`],
//! the operator overrides, and the current time. Rules are checked in order
//! and the first match wins:
//!
//! 1. forced full sync
//! 2. no full sync on record
//! 3. last full sync older than the configured maximum
//! 4. explicit mode override (`disabled` → full, `enabled` → incremental)
//! 5. no sync on record
//! 6. incremental

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::IncrementalSyncConfig;
use crate::state::{SyncMode, SyncState};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Operator setting for incremental sync
///
/// Deserializes through [`FromStr`], so `Enabled` and `enabled` are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum IncrementalMode {
    /// Always incremental once a recent full sync exists
    Enabled,
    /// Always full
    Disabled,
    /// Decide from the state
    #[default]
    Auto,
}

impl FromStr for IncrementalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(IncrementalMode::Enabled),
            "disabled" => Ok(IncrementalMode::Disabled),
            "auto" => Ok(IncrementalMode::Auto),
            other => Err(format!(
                "invalid incremental mode '{}', expected enabled, disabled or auto",
                other
            )),
        }
    }
}

impl TryFrom<String> for IncrementalMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for IncrementalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncrementalMode::Enabled => "enabled",
            IncrementalMode::Disabled => "disabled",
            IncrementalMode::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Operator overrides for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOverrides {
    /// Force a full sync; one-shot, cleared by the caller after use
    pub force_full_sync: bool,
    /// Replaces the configured mode when set
    pub incremental_mode: Option<IncrementalMode>,
}

impl SyncOverrides {
    /// Overrides that force a full sync
    pub fn force_full() -> Self {
        Self {
            force_full_sync: true,
            incremental_mode: None,
        }
    }
}

/// Why a plan was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanReason {
    /// Operator override
    Forced,
    /// `last_full_sync` is zero
    NoFullSync,
    /// Last full sync is at least the configured number of days old
    FullSyncStale { days: i64 },
    /// Mode override set to `disabled`
    ModeDisabled,
    /// Mode override set to `enabled`
    ModeEnabled,
    /// `last_sync_timestamp` is zero
    NeverSynced,
    /// Default incremental case
    RecentFullSync,
}

impl fmt::Display for PlanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanReason::Forced => f.write_str("full sync forced by operator"),
            PlanReason::NoFullSync => f.write_str("no previous full sync"),
            PlanReason::FullSyncStale { days } => {
                write!(f, "last full sync was {} days ago", days)
            }
            PlanReason::ModeDisabled => f.write_str("incremental sync disabled"),
            PlanReason::ModeEnabled => f.write_str("incremental sync enabled"),
            PlanReason::NeverSynced => f.write_str("no previous sync"),
            PlanReason::RecentFullSync => f.write_str("recent full sync on record"),
        }
    }
}

/// Scope of the next run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPlan {
    /// Full or incremental
    pub mode: SyncMode,
    /// First rule that matched
    pub reason: PlanReason,
    /// Changes strictly older than this are skipped; set for incremental plans only
    pub since_ms: Option<i64>,
}

impl SyncPlan {
    fn full(reason: PlanReason) -> Self {
        Self {
            mode: SyncMode::Full,
            reason,
            since_ms: None,
        }
    }

    fn incremental(reason: PlanReason, since_ms: i64) -> Self {
        Self {
            mode: SyncMode::Incremental,
            reason,
            since_ms: Some(since_ms),
        }
    }

    /// Whether this is a full sync
    pub fn is_full(&self) -> bool {
        self.mode == SyncMode::Full
    }

    /// Whether an item last changed at `changed_at_ms` must be processed
    pub fn includes(&self, changed_at_ms: i64) -> bool {
        match self.since_ms {
            Some(since) => changed_at_ms >= since,
            None => true,
        }
    }
}

/// Decides between full and incremental sync
#[derive(Debug, Clone, Default)]
pub struct SyncPlanner {
    config: IncrementalSyncConfig,
}

impl SyncPlanner {
    pub fn new(config: IncrementalSyncConfig) -> Self {
        Self { config }
    }

    /// Decide the scope of the next run
    pub fn plan(&self, state: &SyncState, overrides: &SyncOverrides, now_ms: i64) -> SyncPlan {
        let plan = self.decide(state, overrides, now_ms);

        info!(
            mode = %plan.mode,
            reason = %plan.reason,
            since_ms = ?plan.since_ms,
            "Sync plan decided"
        );

        plan
    }

    fn decide(&self, state: &SyncState, overrides: &SyncOverrides, now_ms: i64) -> SyncPlan {
        if overrides.force_full_sync {
            return SyncPlan::full(PlanReason::Forced);
        }

        if state.last_full_sync == 0 {
            return SyncPlan::full(PlanReason::NoFullSync);
        }

        let days = now_ms.saturating_sub(state.last_full_sync).max(0) / MS_PER_DAY;
        if days >= i64::from(self.config.max_days_between_full) {
            return SyncPlan::full(PlanReason::FullSyncStale { days });
        }

        match overrides.incremental_mode.unwrap_or(self.config.mode) {
            IncrementalMode::Disabled => return SyncPlan::full(PlanReason::ModeDisabled),
            IncrementalMode::Enabled => {
                return SyncPlan::incremental(PlanReason::ModeEnabled, self.threshold(state))
            }
            IncrementalMode::Auto => {}
        }

        if state.last_sync_timestamp == 0 {
            return SyncPlan::full(PlanReason::NeverSynced);
        }

        SyncPlan::incremental(PlanReason::RecentFullSync, self.threshold(state))
    }

    fn threshold(&self, state: &SyncState) -> i64 {
        state
            .last_sync_timestamp
            .saturating_sub(self.config.buffer_ms)
            .max(0)
    }

    /// Get current configuration
    pub fn config(&self) -> &IncrementalSyncConfig {
        &self.config
    }
}
