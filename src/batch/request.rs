//! Batch request and response types

use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::{HttpResponse, PreparedRequest};

/// One logical request in a batch
///
/// Identity is positional: two identical requests in the same batch are
/// executed independently and produce two results.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: String,
    /// Optional JSON body
    pub body: Option<Value>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
}

impl BatchRequest {
    /// Create a request without body or headers
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: HashMap::new(),
        }
    }

    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request with a JSON body
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// PUT request with a JSON body
    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, url).with_body(body)
    }

    /// DELETE request
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Set the JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Turn the description into a sendable request
    pub fn prepare(&self) -> Result<PreparedRequest, TransportError> {
        let mut prepared = PreparedRequest::new(self.method.clone(), self.url.clone())?;
        if let Some(body) = &self.body {
            prepared = prepared.json(body)?;
        }
        for (name, value) in &self.headers {
            prepared = prepared.header(name, value)?;
        }
        Ok(prepared)
    }
}

/// Outcome of one [`BatchRequest`]
///
/// Always carries exactly one of a response or an error.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    /// Position of the request in the submitted batch
    pub index: usize,
    /// The originating request
    pub request: BatchRequest,
    /// Response or error
    pub outcome: Result<HttpResponse, TransportError>,
}

impl BatchResponse {
    /// Whether the request produced a 2xx response
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Whether the request was skipped or aborted by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(TransportError::Cancelled))
    }

    /// The response, if any
    pub fn response(&self) -> Option<&HttpResponse> {
        self.outcome.as_ref().ok()
    }

    /// The error, if any
    pub fn error(&self) -> Option<&TransportError> {
        self.outcome.as_ref().err()
    }

    /// HTTP status of the response or of a status error
    pub fn status(&self) -> Option<u16> {
        match &self.outcome {
            Ok(response) => Some(response.status.as_u16()),
            Err(err) => err.status(),
        }
    }
}

/// Counts over a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of results
    pub total: usize,
    /// Results with a 2xx response
    pub succeeded: usize,
    /// Results with an error other than cancellation
    pub failed: usize,
    /// Results cancelled before or during dispatch
    pub cancelled: usize,
}

impl BatchSummary {
    /// Summarize a set of batch results
    pub fn from_responses(responses: &[BatchResponse]) -> Self {
        responses
            .iter()
            .fold(Self::default(), |mut summary, response| {
                summary.total += 1;
                if response.is_success() {
                    summary.succeeded += 1;
                } else if response.is_cancelled() {
                    summary.cancelled += 1;
                } else {
                    summary.failed += 1;
                }
                summary
            })
    }

    /// Whether every request succeeded
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Restore submission order on a result set
pub fn sort_by_submission(responses: &mut [BatchResponse]) {
    responses.sort_by_key(|response| response.index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    fn response(index: usize, outcome: Result<HttpResponse, TransportError>) -> BatchResponse {
        BatchResponse {
            index,
            request: BatchRequest::get(format!("https://example.com/{}", index)),
            outcome,
        }
    }

    fn ok() -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    // Test 1: Builders set method, body and headers
    #[test]
    fn test_request_builders() {
        let request = BatchRequest::post("https://example.com/items", serde_json::json!({"a": 1}))
            .with_header("Authorization", "Bearer x");

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(serde_json::json!({"a": 1})));
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer x".to_string())
        );
        assert_eq!(BatchRequest::delete("https://example.com").method, Method::DELETE);
    }

    // Test 2: prepare validates URL and headers
    #[test]
    fn test_prepare_validation() {
        assert!(BatchRequest::get("https://example.com/ok").prepare().is_ok());
        assert!(matches!(
            BatchRequest::get("::not a url::").prepare(),
            Err(TransportError::InvalidRequest(_))
        ));
        assert!(matches!(
            BatchRequest::get("https://example.com")
                .with_header("bad header", "v")
                .prepare(),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    // Test 3: Accessors expose exactly one of response or error
    #[test]
    fn test_response_accessors() {
        let success = response(0, ok());
        assert!(success.is_success());
        assert!(success.response().is_some());
        assert!(success.error().is_none());
        assert_eq!(success.status(), Some(200));

        let failure = response(1, Err(TransportError::Status { status: 404 }));
        assert!(!failure.is_success());
        assert!(failure.response().is_none());
        assert_eq!(failure.status(), Some(404));
    }

    // Test 4: Summary counts
    #[test]
    fn test_summary_counts() {
        let responses = vec![
            response(0, ok()),
            response(1, Err(TransportError::Timeout)),
            response(2, Err(TransportError::Cancelled)),
            response(3, ok()),
        ];

        let summary = BatchSummary::from_responses(&responses);
        assert_eq!(
            summary,
            BatchSummary {
                total: 4,
                succeeded: 2,
                failed: 1,
                cancelled: 1,
            }
        );
        assert!(!summary.all_succeeded());
    }

    // Test 5: Sorting restores submission order
    #[test]
    fn test_sort_by_submission() {
        let mut responses = vec![response(2, ok()), response(0, ok()), response(1, ok())];
        sort_by_submission(&mut responses);
        let order: Vec<usize> = responses.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
