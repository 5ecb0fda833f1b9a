//! Persisted sync state
//!
//! [`SyncState`] records when the last sync and the last full sync happened,
//! how the last run ended, and how many runs there have been. It is loaded
//! once per run, updated in memory with [`SyncState::record_sync`], and
//! written back by [`SyncStateStore::save`].

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub use store::SyncStateStore;

/// Current schema version written to disk
pub const SYNC_STATE_VERSION: &str = "1.0";

/// Default state file name, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = "sync_state.json";

/// Outcome of the last sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No run has been recorded
    #[default]
    Never,
    /// Every item was processed
    Success,
    /// The run finished but some items failed
    Partial,
    /// The run did not finish
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Never => "never",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Scope of a sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Rescan everything
    #[default]
    Full,
    /// Only items changed since the watermark
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Durable record of previous sync runs
///
/// Timestamps are epoch milliseconds; zero means "never".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Schema version; backfilled on load when missing
    #[serde(default)]
    pub version: String,

    /// End of the last successful or partial sync
    #[serde(default)]
    pub last_sync_timestamp: i64,

    /// End of the last successful or partial full sync
    #[serde(default)]
    pub last_full_sync: i64,

    /// Number of recorded runs, including failed ones
    #[serde(default)]
    pub sync_count: u64,

    #[serde(default)]
    pub sync_status: SyncStatus,

    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// A state that has never synced
    pub fn new() -> Self {
        Self {
            version: SYNC_STATE_VERSION.to_string(),
            last_sync_timestamp: 0,
            last_full_sync: 0,
            sync_count: 0,
            sync_status: SyncStatus::Never,
            sync_mode: SyncMode::Full,
        }
    }

    /// Record a finished run
    ///
    /// Failed runs bump the counter and status but leave the watermarks alone,
    /// so the next run re-covers the same window. A full-sync watermark ahead
    /// of `now_ms` (the clock stepped back) is pulled back to `now_ms`.
    pub fn record_sync(&mut self, mode: SyncMode, status: SyncStatus, now_ms: i64) {
        self.sync_count += 1;
        self.sync_mode = mode;
        self.sync_status = status;

        if status != SyncStatus::Failed {
            self.last_sync_timestamp = now_ms;
            if mode == SyncMode::Full {
                self.last_full_sync = now_ms;
            } else {
                self.last_full_sync = self.last_full_sync.min(now_ms);
            }
        }
    }

    /// Pull `last_full_sync` back to `last_sync_timestamp` when it is ahead
    ///
    /// Returns whether anything changed.
    pub fn repair_ordering(&mut self) -> bool {
        if self.has_synced() && self.last_full_sync > self.last_sync_timestamp {
            self.last_full_sync = self.last_sync_timestamp;
            return true;
        }
        false
    }

    /// Forget both watermarks so the next plan is a full sync
    pub fn reset(&mut self) {
        self.last_sync_timestamp = 0;
        self.last_full_sync = 0;
        self.sync_status = SyncStatus::Never;
        self.sync_mode = SyncMode::Full;
    }

    /// Whether any run has advanced the watermark
    pub fn has_synced(&self) -> bool {
        self.last_sync_timestamp > 0
    }

    /// Check the on-disk invariants
    pub fn validate(&self) -> Result<(), StateError> {
        if self.version.is_empty() {
            return Err(StateError::Invalid("version must not be empty".to_string()));
        }
        if self.last_sync_timestamp < 0 || self.last_full_sync < 0 {
            return Err(StateError::Invalid(
                "timestamps must not be negative".to_string(),
            ));
        }
        if self.has_synced() && self.last_full_sync > self.last_sync_timestamp {
            return Err(StateError::Invalid(format!(
                "last_full_sync ({}) is after last_sync_timestamp ({})",
                self.last_full_sync, self.last_sync_timestamp
            )));
        }
        Ok(())
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Fresh state means never synced
    #[test]
    fn test_new_state() {
        let state = SyncState::new();
        assert_eq!(state.version, SYNC_STATE_VERSION);
        assert_eq!(state.last_sync_timestamp, 0);
        assert_eq!(state.last_full_sync, 0);
        assert_eq!(state.sync_status, SyncStatus::Never);
        assert!(!state.has_synced());
        assert!(state.validate().is_ok());
    }

    // Test 2: Full success advances both watermarks
    #[test]
    fn test_record_full_success() {
        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 1_000);

        assert_eq!(state.last_sync_timestamp, 1_000);
        assert_eq!(state.last_full_sync, 1_000);
        assert_eq!(state.sync_count, 1);
        assert_eq!(state.sync_mode, SyncMode::Full);
        assert!(state.validate().is_ok());
    }

    // Test 3: Incremental run leaves the full-sync watermark alone
    #[test]
    fn test_record_incremental_partial() {
        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 1_000);
        state.record_sync(SyncMode::Incremental, SyncStatus::Partial, 2_000);

        assert_eq!(state.last_sync_timestamp, 2_000);
        assert_eq!(state.last_full_sync, 1_000);
        assert_eq!(state.sync_count, 2);
        assert_eq!(state.sync_status, SyncStatus::Partial);
        assert!(state.validate().is_ok());
    }

    // Test 4: Failed run does not move the watermarks
    #[test]
    fn test_record_failed() {
        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 1_000);
        state.record_sync(SyncMode::Full, SyncStatus::Failed, 5_000);

        assert_eq!(state.last_sync_timestamp, 1_000);
        assert_eq!(state.last_full_sync, 1_000);
        assert_eq!(state.sync_count, 2);
        assert_eq!(state.sync_status, SyncStatus::Failed);
    }

    // Test 5: Reset clears watermarks but keeps the counter
    #[test]
    fn test_reset() {
        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 1_000);
        state.reset();

        assert!(!state.has_synced());
        assert_eq!(state.last_full_sync, 0);
        assert_eq!(state.sync_count, 1);
        assert_eq!(state.sync_status, SyncStatus::Never);
    }

    // Test 6: Validation rejects broken invariants
    #[test]
    fn test_validate() {
        let mut state = SyncState::new();
        state.last_sync_timestamp = 100;
        state.last_full_sync = 200;
        assert!(matches!(state.validate(), Err(StateError::Invalid(_))));

        let mut state = SyncState::new();
        state.version.clear();
        assert!(matches!(state.validate(), Err(StateError::Invalid(_))));
    }

    // Test 7: Enums use lowercase names on disk
    #[test]
    fn test_serialized_names() {
        let mut state = SyncState::new();
        state.record_sync(SyncMode::Incremental, SyncStatus::Partial, 10);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["sync_mode"], "incremental");
        assert_eq!(value["sync_status"], "partial");
        assert_eq!(SyncStatus::Never.to_string(), "never");
    }

    // Test 8: Clock stepped back behind the full-sync watermark
    #[test]
    fn test_record_incremental_after_clock_step_back() {
        let now = 1_700_000_000_000;
        let ahead = now + 60 * 60 * 1000;

        let mut state = SyncState::new();
        state.last_sync_timestamp = ahead;
        state.last_full_sync = ahead;

        state.record_sync(SyncMode::Incremental, SyncStatus::Success, now);

        assert_eq!(state.last_sync_timestamp, now);
        assert_eq!(state.last_full_sync, now);
        assert!(state.validate().is_ok());
    }

    // Test 9: Ordering repair only touches inconsistent states
    #[test]
    fn test_repair_ordering() {
        let mut state = SyncState::new();
        state.last_sync_timestamp = 100;
        state.last_full_sync = 200;
        assert!(state.repair_ordering());
        assert_eq!(state.last_full_sync, 100);
        assert!(state.validate().is_ok());

        assert!(!state.repair_ordering());

        let mut never = SyncState::new();
        never.last_full_sync = 50;
        assert!(!never.repair_ordering());
        assert_eq!(never.last_full_sync, 50);
    }
}
