//! Bounded-concurrency batch executor
//!
//! A fixed pool of workers pulls requests from a bounded FIFO queue, sends
//! each one through the [`TransportClient`], and waits until the configured
//! interval has passed since its previous completion before dispatching
//! again. Throughput is therefore capped at `workers / interval` regardless
//! of upstream latency.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::request::{BatchRequest, BatchResponse, BatchSummary};
use crate::config::BatchConfig;
use crate::error::TransportError;
use crate::transport::TransportClient;

type WorkQueue = Arc<Mutex<mpsc::Receiver<(usize, BatchRequest)>>>;

/// Executes batches of independent requests
///
/// A failing request never affects its siblings: every submitted request
/// yields exactly one [`BatchResponse`].
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    client: Arc<TransportClient>,
    config: BatchConfig,
}

impl BatchExecutor {
    /// Create a new executor sharing `client`
    pub fn new(client: Arc<TransportClient>, config: BatchConfig) -> Self {
        Self { client, config }
    }

    /// Execute all requests and return one result per request
    ///
    /// Results arrive in completion order; use [`BatchResponse::index`] or
    /// [`super::sort_by_submission`] to correlate. Once `cancel` fires, workers
    /// stop dispatching and record remaining requests as cancelled. Dropping
    /// the returned future aborts the producer and every worker.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        requests: Vec<BatchRequest>,
    ) -> Vec<BatchResponse> {
        if requests.is_empty() {
            return Vec::new();
        }

        let total = requests.len();
        let workers = self.config.workers.max(1).min(total);
        let interval = Duration::from_millis(self.config.interval_ms);
        let started = Instant::now();

        info!(
            total,
            workers,
            interval_ms = self.config.interval_ms,
            "Starting batch"
        );

        let (work_tx, work_rx) = mpsc::channel(self.config.batch_size.max(1));
        let work_rx: WorkQueue = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel(total);

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            for item in requests.into_iter().enumerate() {
                if work_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        for worker in 0..workers {
            tasks.spawn(run_worker(
                worker,
                Arc::clone(&self.client),
                Arc::clone(&work_rx),
                result_tx.clone(),
                cancel.clone(),
                interval,
            ));
        }
        drop(result_tx);

        let mut responses = Vec::with_capacity(total);
        while let Some(response) = result_rx.recv().await {
            responses.push(response);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Batch task failed");
            }
        }

        let summary = BatchSummary::from_responses(&responses);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch completed"
        );

        responses
    }

    /// Get the shared transport client
    pub fn client(&self) -> &Arc<TransportClient> {
        &self.client
    }

    /// Get current configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

async fn run_worker(
    worker: usize,
    client: Arc<TransportClient>,
    queue: WorkQueue,
    results: mpsc::Sender<BatchResponse>,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut dispatched = 0usize;
    let mut ready_at: Option<Instant> = None;

    loop {
        let next = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some((index, request)) = next else {
            break;
        };

        if let Some(at) = ready_at.take() {
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {}
                _ = cancel.cancelled() => {}
            }
        }

        if cancel.is_cancelled() {
            let response = BatchResponse {
                index,
                request,
                outcome: Err(TransportError::Cancelled),
            };
            if results.send(response).await.is_err() {
                break;
            }
            continue;
        }

        let (outcome, sent) = match request.prepare() {
            Ok(prepared) => (client.dispatch(&cancel, &prepared).await, true),
            Err(err) => (Err(err), false),
        };
        if sent {
            dispatched += 1;
        }

        if results
            .send(BatchResponse {
                index,
                request,
                outcome,
            })
            .await
            .is_err()
        {
            break;
        }

        if sent && !interval.is_zero() {
            ready_at = Some(Instant::now() + interval);
        }
    }

    debug!(worker, dispatched, "Batch worker finished");
}
