//! Single sync run: load state, plan, run the source, record, save

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, SourceError};
use crate::planner::{SyncOverrides, SyncPlan, SyncPlanner};
use crate::state::{now_ms, SyncState, SyncStateStore, SyncStatus};

/// Item counts reported by a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items processed successfully
    pub processed: u64,
    /// Items outside the plan's window
    pub skipped: u64,
    /// Items that failed
    pub failed: u64,
}

impl SyncReport {
    /// Run status implied by the counts
    pub fn status(&self) -> SyncStatus {
        if self.failed == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        }
    }
}

/// Work performed during a sync run
///
/// Implementations enumerate upstream items, use [`SyncPlan::includes`] to
/// skip unchanged ones, and push the rest through the batch executor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Process the items selected by `plan`
    ///
    /// Per-item failures belong in [`SyncReport::failed`]; an `Err` means the
    /// run as a whole did not finish.
    async fn sync(
        &self,
        plan: &SyncPlan,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SourceError>;
}

/// Result of one coordinated run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Plan the source was run with
    pub plan: SyncPlan,
    /// What the source returned
    pub report: Result<SyncReport, SourceError>,
    /// Status recorded for the run
    pub status: SyncStatus,
    /// State as persisted after the run
    pub state: SyncState,
}

/// Drives one sync run end to end
pub struct SyncCoordinator {
    source: Arc<dyn SyncSource>,
    store: SyncStateStore,
    planner: SyncPlanner,
    overrides: Mutex<SyncOverrides>,
}

impl SyncCoordinator {
    /// Create a new coordinator
    pub fn new(source: Arc<dyn SyncSource>, store: SyncStateStore, planner: SyncPlanner) -> Self {
        Self {
            source,
            store,
            planner,
            overrides: Mutex::new(SyncOverrides::default()),
        }
    }

    /// Set the initial operator overrides
    pub fn with_overrides(self, overrides: SyncOverrides) -> Self {
        Self {
            overrides: Mutex::new(overrides),
            ..self
        }
    }

    /// Request a full sync on the next run
    pub async fn force_full_sync(&self) {
        self.overrides.lock().await.force_full_sync = true;
    }

    /// Current operator overrides
    pub async fn overrides(&self) -> SyncOverrides {
        *self.overrides.lock().await
    }

    /// Get the state store
    pub fn store(&self) -> &SyncStateStore {
        &self.store
    }

    /// Run one sync
    ///
    /// A source error is recorded as a failed run and returned inside the
    /// outcome. State load and save errors abort the run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome, AppError> {
        let mut state = self.store.load().await?;
        let overrides = self.overrides().await;
        let plan = self.planner.plan(&state, &overrides, now_ms());

        let started = Instant::now();
        let report = self.source.sync(&plan, cancel).await;
        let status = match &report {
            Ok(report) => report.status(),
            Err(_) => SyncStatus::Failed,
        };

        state.record_sync(plan.mode, status, now_ms());
        self.store.save(&state).await?;

        if overrides.force_full_sync {
            self.overrides.lock().await.force_full_sync = false;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match &report {
            Ok(counts) => info!(
                source = self.source.name(),
                mode = %plan.mode,
                status = %status,
                processed = counts.processed,
                skipped = counts.skipped,
                failed = counts.failed,
                duration_ms,
                "Sync run completed"
            ),
            Err(e) => warn!(
                source = self.source.name(),
                mode = %plan.mode,
                error = %e,
                duration_ms,
                "Sync run failed"
            ),
        }

        Ok(RunOutcome {
            plan,
            report,
            status,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlanReason;
    use crate::state::SyncMode;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir, source: MockSyncSource) -> SyncCoordinator {
        SyncCoordinator::new(
            Arc::new(source),
            SyncStateStore::new(dir.path().join("state.json")),
            SyncPlanner::default(),
        )
    }

    fn source(report: Result<SyncReport, SourceError>) -> MockSyncSource {
        let mut source = MockSyncSource::new();
        source.expect_name().return_const("test".to_string());
        source
            .expect_sync()
            .returning(move |_, _| report.clone());
        source
    }

    // Test 1: First run is full and advances both watermarks
    #[tokio::test]
    async fn test_first_run_is_full() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            &dir,
            source(Ok(SyncReport {
                processed: 3,
                ..Default::default()
            })),
        );

        let outcome = coordinator.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.plan.mode, SyncMode::Full);
        assert_eq!(outcome.status, SyncStatus::Success);
        assert!(outcome.state.last_full_sync > 0);
        assert_eq!(outcome.state.last_full_sync, outcome.state.last_sync_timestamp);

        let persisted = coordinator.store().load().await.unwrap();
        assert_eq!(persisted, outcome.state);
    }

    // Test 2: Second run is incremental
    #[tokio::test]
    async fn test_second_run_is_incremental() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, source(Ok(SyncReport::default())));

        coordinator.run(&CancellationToken::new()).await.unwrap();
        let outcome = coordinator.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.plan.mode, SyncMode::Incremental);
        assert_eq!(outcome.state.sync_count, 2);
    }

    // Test 3: Some failed items make a partial run
    #[tokio::test]
    async fn test_partial_run() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            &dir,
            source(Ok(SyncReport {
                processed: 8,
                skipped: 0,
                failed: 2,
            })),
        );

        let outcome = coordinator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.status, SyncStatus::Partial);
        assert!(outcome.state.has_synced());
    }

    // Test 4: Source error records a failed run without moving watermarks
    #[tokio::test]
    async fn test_failed_run() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            &dir,
            source(Err(SourceError::InvalidData("bad payload".to_string()))),
        );

        let outcome = coordinator.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.status, SyncStatus::Failed);
        assert!(outcome.report.is_err());
        assert_eq!(outcome.state.last_sync_timestamp, 0);
        assert_eq!(outcome.state.sync_count, 1);
    }

    // Test 5: Force flag applies once and is then cleared
    #[tokio::test]
    async fn test_force_flag_is_one_shot() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, source(Ok(SyncReport::default())));

        coordinator.run(&CancellationToken::new()).await.unwrap();
        coordinator.force_full_sync().await;

        let forced = coordinator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(forced.plan.reason, PlanReason::Forced);
        assert!(!coordinator.overrides().await.force_full_sync);

        let next = coordinator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(next.plan.mode, SyncMode::Incremental);
    }

    // Test 6: Corrupt state aborts before the source runs
    #[tokio::test]
    async fn test_corrupt_state_aborts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state.json"), "not json").unwrap();

        let mut source = MockSyncSource::new();
        source.expect_name().return_const("test".to_string());
        source.expect_sync().never();

        let coordinator = coordinator(&dir, source);
        let result = coordinator.run(&CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(AppError::State(crate::error::StateError::Corrupt { .. }))
        ));
    }

    // Test 7: Source receives the incremental threshold
    #[tokio::test]
    async fn test_plan_passed_to_source() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path().join("state.json"));

        let mut state = SyncState::new();
        let last = now_ms() - 60_000;
        state.record_sync(SyncMode::Full, SyncStatus::Success, last);
        store.save(&state).await.unwrap();

        let mut source = MockSyncSource::new();
        source.expect_name().return_const("test".to_string());
        source
            .expect_sync()
            .withf(move |plan, _| plan.since_ms == Some(last - 300_000))
            .times(1)
            .returning(|_, _| Ok(SyncReport::default()));

        let coordinator = SyncCoordinator::new(Arc::new(source), store, SyncPlanner::default());
        let outcome = coordinator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.plan.mode, SyncMode::Incremental);
    }
}
