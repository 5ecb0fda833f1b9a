//! Sync state persistence integration tests
//!
//! Tests the state file contract:
//! - Missing file yields a never-synced state and a full plan
//! - Round-trip of every field
//! - Corrupt files are surfaced

use sync_core::config::Config;
use sync_core::error::StateError;
use sync_core::planner::{SyncOverrides, SyncPlanner};
use sync_core::state::{SyncMode, SyncState, SyncStateStore, SyncStatus, SYNC_STATE_VERSION};
use tempfile::TempDir;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const NOW: i64 = 1_750_000_000_000;

/// Test 1: Missing file plans a full sync
#[tokio::test]
async fn test_missing_state_plans_full() {
    let dir = TempDir::new().unwrap();
    let store = SyncStateStore::new(dir.path().join("absent.json"));

    let state = store.load().await.unwrap();
    assert_eq!(state.last_sync_timestamp, 0);
    assert_eq!(state.last_full_sync, 0);

    let plan = SyncPlanner::default().plan(&state, &SyncOverrides::default(), NOW);
    assert_eq!(plan.mode, SyncMode::Full);
}

/// Test 2: One-day-old state on disk plans incremental with buffered threshold
#[tokio::test]
async fn test_recent_state_plans_incremental() {
    let dir = TempDir::new().unwrap();
    let store = SyncStateStore::new(dir.path().join("sync_state.json"));

    let mut state = SyncState::new();
    state.record_sync(SyncMode::Full, SyncStatus::Success, NOW - DAY_MS);
    store.save(&state).await.unwrap();

    let loaded = store.load().await.unwrap();
    let plan = SyncPlanner::default().plan(&loaded, &SyncOverrides::default(), NOW);

    assert_eq!(plan.mode, SyncMode::Incremental);
    assert_eq!(plan.since_ms, Some(NOW - DAY_MS - 300_000));
}

/// Test 3: On-disk document uses the documented field names
#[tokio::test]
async fn test_state_file_format() {
    let dir = TempDir::new().unwrap();
    let store = SyncStateStore::new(dir.path().join("sync_state.json"));

    let mut state = SyncState::new();
    state.record_sync(SyncMode::Full, SyncStatus::Success, 1_000);
    state.record_sync(SyncMode::Incremental, SyncStatus::Partial, 2_000);
    store.save(&state).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(value["version"], SYNC_STATE_VERSION);
    assert_eq!(value["last_sync_timestamp"], 2_000);
    assert_eq!(value["last_full_sync"], 1_000);
    assert_eq!(value["sync_count"], 2);
    assert_eq!(value["sync_status"], "partial");
    assert_eq!(value["sync_mode"], "incremental");

    assert_eq!(store.load().await.unwrap(), state);
}

/// Test 4: Corrupt file is surfaced to the caller
#[tokio::test]
async fn test_corrupt_state_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync_state.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    let result = SyncStateStore::new(&path).load().await;
    assert!(matches!(result, Err(StateError::Corrupt { .. })));
}

/// Test 5: Store path comes from configuration
#[tokio::test]
async fn test_store_from_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("custom.json");
    let yaml = format!("state:\n  path: \"{}\"\n", path.display());

    let config = Config::from_yaml(&yaml).unwrap();
    let store = SyncStateStore::from_config(&config.state);
    store.save(&SyncState::new()).await.unwrap();

    assert!(path.exists());
}
