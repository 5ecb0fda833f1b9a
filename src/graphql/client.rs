//! GraphQL client with server-side batching
//!
//! A submission of N documents is sent as one POST whose body is a JSON array;
//! the server answers with an array of N responses matched by position.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{GraphQLRequest, GraphQLResponse};
use crate::batch::{sort_by_submission, BatchExecutor, BatchRequest};
use crate::config::GraphQLConfig;
use crate::error::GraphQLBatchError;
use crate::transport::HttpResponse;

/// Submits GraphQL documents through a [`BatchExecutor`]
#[derive(Debug, Clone)]
pub struct GraphQLBatchClient {
    executor: Arc<BatchExecutor>,
    config: GraphQLConfig,
    headers: HashMap<String, String>,
}

impl GraphQLBatchClient {
    /// Create a new client; a configured bearer token becomes the Authorization header
    pub fn new(executor: Arc<BatchExecutor>, config: GraphQLConfig) -> Self {
        let mut headers = HashMap::new();
        if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        Self {
            executor,
            config,
            headers,
        }
    }

    /// Add a header sent with every submission
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the bearer token
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    /// Submit several documents and return one response per document, in order
    ///
    /// The call fails as a whole when the HTTP transaction fails or when the
    /// server's array does not match the submission. Application errors inside
    /// each element are returned as data.
    pub async fn execute_batch(
        &self,
        cancel: &CancellationToken,
        documents: &[GraphQLRequest],
    ) -> Result<Vec<GraphQLResponse>, GraphQLBatchError> {
        if documents.is_empty() {
            return Err(GraphQLBatchError::EmptyBatch);
        }

        let chunk_size = match self.config.max_documents_per_request {
            0 => documents.len(),
            max => max,
        };
        let chunks: Vec<&[GraphQLRequest]> = documents.chunks(chunk_size).collect();

        let requests = chunks
            .iter()
            .map(|chunk| {
                let body = serde_json::to_value(chunk)
                    .map_err(|e| GraphQLBatchError::Encode(e.to_string()))?;
                Ok(self.build_request(body))
            })
            .collect::<Result<Vec<_>, GraphQLBatchError>>()?;

        debug!(
            endpoint = %self.config.endpoint,
            documents = documents.len(),
            chunks = chunks.len(),
            "Submitting GraphQL batch"
        );

        let mut results = self.executor.execute(cancel, requests).await;
        sort_by_submission(&mut results);

        let mut responses = Vec::with_capacity(documents.len());
        for (chunk, result) in chunks.iter().zip(results) {
            let http = result.outcome?;
            responses.extend(decode_array(&http, chunk.len())?);
        }

        if responses.len() != documents.len() {
            return Err(GraphQLBatchError::CountMismatch {
                expected: documents.len(),
                actual: responses.len(),
            });
        }

        let with_errors = responses.iter().filter(|r| r.has_errors()).count();
        if with_errors > 0 {
            debug!(
                documents = documents.len(),
                with_errors, "GraphQL batch returned application errors"
            );
        }

        Ok(responses)
    }

    /// Submit a single document as a plain object body
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        document: &GraphQLRequest,
    ) -> Result<GraphQLResponse, GraphQLBatchError> {
        let body =
            serde_json::to_value(document).map_err(|e| GraphQLBatchError::Encode(e.to_string()))?;

        let result = self
            .executor
            .execute(cancel, vec![self.build_request(body)])
            .await
            .into_iter()
            .next()
            .ok_or(GraphQLBatchError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        result
            .outcome?
            .json()
            .map_err(|e| GraphQLBatchError::InvalidResponse(e.to_string()))
    }

    /// Get current configuration
    pub fn config(&self) -> &GraphQLConfig {
        &self.config
    }

    fn build_request(&self, body: Value) -> BatchRequest {
        self.headers.iter().fold(
            BatchRequest::post(self.config.endpoint.clone(), body),
            |request, (name, value)| request.with_header(name.clone(), value.clone()),
        )
    }
}

fn decode_array(
    response: &HttpResponse,
    expected: usize,
) -> Result<Vec<GraphQLResponse>, GraphQLBatchError> {
    let value: Value = response
        .json()
        .map_err(|e| GraphQLBatchError::InvalidResponse(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(GraphQLBatchError::InvalidResponse(
            "expected a JSON array of responses".to_string(),
        ));
    };

    if items.len() != expected {
        return Err(GraphQLBatchError::CountMismatch {
            expected,
            actual: items.len(),
        });
    }

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| GraphQLBatchError::InvalidResponse(e.to_string()))
        })
        .collect()
}
