//! Periodic sync scheduler
//!
//! Runs the coordinator once at startup and then on a fixed interval with
//! random jitter so that several agents started together do not hit the
//! upstream at the same moment. Each run is bounded by a timeout.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::coordinator::{RunOutcome, SyncCoordinator};
use crate::config::SchedulerConfig;
use crate::error::{AppError, SourceError};
use crate::state::SyncStatus;

/// How long a timed-out run may take to wind down after cancellation
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Observable scheduler state
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// When the last run finished
    pub last_run: Option<SystemTime>,
    /// Status of the last run, or the error that aborted it
    pub last_result: Option<Result<SyncStatus, String>>,
    /// Estimated start of the next scheduled run
    pub next_run: Option<SystemTime>,
    /// Whether a run is in progress
    pub in_progress: bool,
    /// Number of finished runs
    pub runs: u64,
}

/// Manual sync request
struct ManualSyncRequest {
    force_full: bool,
    response: mpsc::Sender<Result<RunOutcome, AppError>>,
}

/// Periodic driver for a [`SyncCoordinator`]
pub struct SyncScheduler {
    config: SchedulerConfig,
    coordinator: Arc<SyncCoordinator>,
    status: Arc<RwLock<SchedulerStatus>>,
    shutdown: CancellationToken,
    manual_sync_rx: mpsc::Receiver<ManualSyncRequest>,
    manual_sync_tx: mpsc::Sender<ManualSyncRequest>,
}

impl SyncScheduler {
    /// Create a new sync scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Scheduler configuration
    /// * `coordinator` - Coordinator performing each run
    /// * `shutdown` - Cancelled to stop the scheduler and abort a run in progress
    pub fn new(
        config: SchedulerConfig,
        coordinator: Arc<SyncCoordinator>,
        shutdown: CancellationToken,
    ) -> Self {
        let (manual_sync_tx, manual_sync_rx) = mpsc::channel(8);

        Self {
            config,
            coordinator,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            shutdown,
            manual_sync_rx,
            manual_sync_tx,
        }
    }

    /// Get a handle for triggering manual syncs and reading status
    pub fn manual_sync_handle(&self) -> ManualSyncHandle {
        ManualSyncHandle {
            tx: self.manual_sync_tx.clone(),
            status: self.status.clone(),
        }
    }

    /// Get the current status
    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(mut self) {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        info!(
            interval_secs = interval.as_secs(),
            jitter_secs = self.config.jitter_secs,
            "Starting sync scheduler"
        );

        info!("Performing initial sync");
        let _ = self.perform_sync(false).await;

        let jitter = self.jitter();
        let mut timer = interval_at(Instant::now() + interval + jitter, interval);
        self.set_next_run(interval + jitter).await;

        debug!(
            interval_secs = interval.as_secs(),
            jitter_secs = jitter.as_secs(),
            "Scheduled next sync"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping sync scheduler");
                    break;
                }
                _ = timer.tick() => {
                    let jitter = self.jitter();
                    if !jitter.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(jitter) => {}
                            _ = self.shutdown.cancelled() => continue,
                        }
                    }

                    info!("Performing scheduled sync");
                    let _ = self.perform_sync(false).await;
                    self.set_next_run(interval).await;
                }
                Some(request) = self.manual_sync_rx.recv() => {
                    self.handle_manual_sync(request).await;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_secs > 0 {
            Duration::from_secs(rand::thread_rng().gen_range(0..self.config.jitter_secs))
        } else {
            Duration::ZERO
        }
    }

    async fn set_next_run(&self, after: Duration) {
        self.status.write().await.next_run = Some(SystemTime::now() + after);
    }

    async fn perform_sync(&self, force_full: bool) -> Result<RunOutcome, AppError> {
        self.status.write().await.in_progress = true;

        if force_full {
            self.coordinator.force_full_sync().await;
        }

        let timeout_secs = self.config.sync_timeout_secs;
        let cancel = self.shutdown.child_token();
        let run = self.coordinator.run(&cancel);
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                error!(timeout_secs, "Sync timed out");
                cancel.cancel();
                match tokio::time::timeout(CANCEL_GRACE, &mut run).await {
                    Ok(Err(e)) => Err(e),
                    _ => Err(SourceError::TimedOut(timeout_secs).into()),
                }
            }
        };

        let mut status = self.status.write().await;
        status.in_progress = false;
        status.last_run = Some(SystemTime::now());
        status.runs += 1;

        match &result {
            Ok(outcome) => {
                if let Err(e) = &outcome.report {
                    warn!(error = %e, "Sync run reported failure");
                }
                status.last_result = Some(Ok(outcome.status));
            }
            Err(e) => {
                error!(error = %e, "Sync run aborted");
                status.last_result = Some(Err(e.to_string()));
            }
        }

        result
    }

    async fn handle_manual_sync(&self, request: ManualSyncRequest) {
        info!(force_full = request.force_full, "Manual sync triggered");
        let result = self.perform_sync(request.force_full).await;
        let _ = request.response.send(result).await;
    }
}

/// Handle for triggering manual syncs
#[derive(Clone)]
pub struct ManualSyncHandle {
    tx: mpsc::Sender<ManualSyncRequest>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl ManualSyncHandle {
    /// Trigger a sync now and wait for its outcome
    pub async fn trigger_sync(&self) -> Result<RunOutcome, AppError> {
        self.request(false).await
    }

    /// Trigger a full sync now and wait for its outcome
    pub async fn trigger_full_sync(&self) -> Result<RunOutcome, AppError> {
        self.request(true).await
    }

    /// Current scheduler status
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    async fn request(&self, force_full: bool) -> Result<RunOutcome, AppError> {
        let (response_tx, mut response_rx) = mpsc::channel(1);

        self.tx
            .send(ManualSyncRequest {
                force_full,
                response: response_tx,
            })
            .await
            .map_err(|_| AppError::Internal("Scheduler not running".to_string()))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| AppError::Internal("No response from scheduler".to_string()))?
    }
}
