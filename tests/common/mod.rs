//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sync_core::batch::{BatchExecutor, BatchRequest};
use sync_core::config::{BatchConfig, GraphQLConfig, HttpClientConfig, RetryConfig};
use sync_core::error::SourceError;
use sync_core::graphql::GraphQLBatchClient;
use sync_core::planner::SyncPlan;
use sync_core::sync::{SyncReport, SyncSource};
use sync_core::transport::TransportClient;

/// Retry configuration without backoff delays
pub fn fast_retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Create a transport client with fast retries
pub fn create_test_transport(max_attempts: u32) -> Arc<TransportClient> {
    Arc::new(
        TransportClient::new(HttpClientConfig::default(), fast_retry_config(max_attempts))
            .expect("Failed to create transport client"),
    )
}

/// Create a batch executor with the given pool size and pacing
pub fn create_test_executor(workers: usize, interval_ms: u64) -> Arc<BatchExecutor> {
    Arc::new(BatchExecutor::new(
        create_test_transport(3),
        BatchConfig {
            batch_size: 8,
            workers,
            interval_ms,
        },
    ))
}

/// Create a GraphQL client pointing at `endpoint`
pub fn create_test_graphql_client(endpoint: String) -> GraphQLBatchClient {
    GraphQLBatchClient::new(
        create_test_executor(2, 0),
        GraphQLConfig {
            endpoint,
            bearer_token: None,
            max_documents_per_request: 0,
        },
    )
}

/// An upstream item with its last modification time
#[derive(Debug, Clone)]
pub struct TestItem {
    pub url: String,
    pub changed_at_ms: i64,
}

/// Sync source that fetches every item selected by the plan
pub struct HttpItemSource {
    pub executor: Arc<BatchExecutor>,
    pub items: Vec<TestItem>,
}

#[async_trait]
impl SyncSource for HttpItemSource {
    fn name(&self) -> &str {
        "http-items"
    }

    async fn sync(
        &self,
        plan: &SyncPlan,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SourceError> {
        let (selected, skipped): (Vec<_>, Vec<_>) = self
            .items
            .iter()
            .partition(|item| plan.includes(item.changed_at_ms));

        let requests = selected
            .iter()
            .map(|item| BatchRequest::get(item.url.clone()))
            .collect();
        let results = self.executor.execute(cancel, requests).await;

        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count() as u64;
        Ok(SyncReport {
            processed: results.len() as u64 - failed,
            skipped: skipped.len() as u64,
            failed,
        })
    }
}
