//! File-backed sync state store

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{SyncState, SYNC_STATE_VERSION};
use crate::config::StateConfig;
use crate::error::StateError;

/// Loads and saves [`SyncState`] as a JSON file
///
/// Single writer: nothing prevents two processes from sharing a path.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    /// Create a store for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store from configuration
    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(&config.path)
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state; a missing file yields a fresh state
    pub async fn load(&self) -> Result<SyncState, StateError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No sync state found, starting fresh");
                return Ok(SyncState::new());
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut state: SyncState =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        if state.version.is_empty() {
            debug!(path = %self.path.display(), "Backfilling sync state version");
            state.version = SYNC_STATE_VERSION.to_string();
        }

        if state.last_sync_timestamp < 0 || state.last_full_sync < 0 {
            return Err(StateError::Corrupt {
                path: self.path.clone(),
                message: format!(
                    "negative timestamp (last_sync_timestamp {}, last_full_sync {})",
                    state.last_sync_timestamp, state.last_full_sync
                ),
            });
        }

        if state.repair_ordering() {
            warn!(
                path = %self.path.display(),
                last_sync = state.last_sync_timestamp,
                "last_full_sync was ahead of last_sync_timestamp, pulled back"
            );
        }

        debug!(
            path = %self.path.display(),
            last_sync = state.last_sync_timestamp,
            last_full_sync = state.last_full_sync,
            sync_count = state.sync_count,
            "Loaded sync state"
        );

        Ok(state)
    }

    /// Write the whole state, replacing the previous file atomically
    pub async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        state.validate()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StateError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let content = serde_json::to_vec_pretty(state)
            .map_err(|e| StateError::Serialize(e.to_string()))?;

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|source| StateError::Io {
                path: temp_path.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StateError::Io {
                path: self.path.clone(),
                source,
            });
        }

        debug!(
            path = %self.path.display(),
            sync_count = state.sync_count,
            status = %state.sync_status,
            "Saved sync state"
        );

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SyncMode, SyncStatus};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SyncStateStore {
        SyncStateStore::new(dir.path().join("sync_state.json"))
    }

    // Test 1: Missing file yields a fresh state
    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let state = store(&dir).load().await.unwrap();

        assert_eq!(state, SyncState::new());
        assert_eq!(state.last_sync_timestamp, 0);
        assert_eq!(state.last_full_sync, 0);
    }

    // Test 2: Save and reload reproduce every field
    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 1_700_000_000_000);
        state.record_sync(SyncMode::Incremental, SyncStatus::Partial, 1_700_000_600_000);

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, state);
    }

    // Test 3: Corrupt file is an error, not a silent reset
    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }

    // Test 4: Missing version is backfilled
    #[tokio::test]
    async fn test_version_backfill() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::write(
            store.path(),
            br#"{"last_sync_timestamp": 2000, "last_full_sync": 1000, "sync_count": 3}"#,
        )
        .await
        .unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.version, SYNC_STATE_VERSION);
        assert_eq!(state.last_sync_timestamp, 2000);
        assert_eq!(state.sync_count, 3);
        assert_eq!(state.sync_status, SyncStatus::Never);
    }

    // Test 5: Save creates missing directories and leaves no temp file
    #[tokio::test]
    async fn test_save_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");
        let store = SyncStateStore::new(&path);

        store.save(&SyncState::new()).await.unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"version\": \"1.0\""));
    }

    // Test 6: Invalid state is refused before touching disk
    #[tokio::test]
    async fn test_save_rejects_invalid_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut state = SyncState::new();
        state.last_sync_timestamp = 10;
        state.last_full_sync = 20;

        assert!(matches!(
            store.save(&state).await,
            Err(StateError::Invalid(_))
        ));
        assert!(!store.path().exists());
    }

    // Test 7: Save overwrites the previous file in full
    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut state = SyncState::new();
        state.record_sync(SyncMode::Full, SyncStatus::Success, 5_000);
        store.save(&state).await.unwrap();

        state.reset();
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.last_full_sync, 0);
        assert_eq!(loaded.sync_count, 1);
    }

    // Test 8: Negative timestamps are rejected as corrupt
    #[tokio::test]
    async fn test_load_negative_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let content = format!(
            r#"{{"version": "1.0", "last_sync_timestamp": 1000, "last_full_sync": {}}}"#,
            i64::MIN
        );
        tokio::fs::write(store.path(), content).await.unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }

    // Test 9: Watermarks written ahead of the clock still save after a run
    #[tokio::test]
    async fn test_future_watermarks_survive_incremental_run() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let now = crate::state::now_ms();
        let ahead = now + 60 * 60 * 1000;
        let content = format!(
            r#"{{"version": "1.0", "last_sync_timestamp": {ahead}, "last_full_sync": {ahead}}}"#
        );
        tokio::fs::write(store.path(), content).await.unwrap();

        let mut state = store.load().await.unwrap();
        state.record_sync(SyncMode::Incremental, SyncStatus::Success, now);
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.last_sync_timestamp, now);
        assert_eq!(loaded.last_full_sync, now);
    }

    // Test 10: Full sync stamped after the last sync is repaired on load
    #[tokio::test]
    async fn test_load_repairs_ordering() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::write(
            store.path(),
            br#"{"version": "1.0", "last_sync_timestamp": 1000, "last_full_sync": 5000}"#,
        )
        .await
        .unwrap();

        let mut state = store.load().await.unwrap();
        assert_eq!(state.last_full_sync, 1000);

        state.record_sync(SyncMode::Incremental, SyncStatus::Failed, 9000);
        store.save(&state).await.unwrap();
    }
}
