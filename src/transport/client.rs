//! Retrying HTTP transport for upstream API calls
//!
//! All verbs funnel into [`TransportClient::dispatch`], which owns the retry
//! loop, backoff sleeps, per-host connection limits, cancellation and call
//! logging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::{Attempt, RetryManager};
use crate::config::{HttpClientConfig, RetryConfig};
use crate::error::TransportError;

/// A fully read upstream response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Header value as a string, if present and valid
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A request ready to be sent, possibly several times
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl PreparedRequest {
    /// Start a request; the URL is validated here
    pub fn new(method: Method, url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", url, e)))?;

        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Encode `body` as JSON and set the content type
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, TransportError> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| TransportError::InvalidRequest(format!("body encoding: {}", e)))?;
        self.body = Some(Bytes::from(encoded));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// HTTP client with retry, backoff and per-host connection limits
///
/// Features:
/// - Bounded attempts with exponential backoff for 5xx and temporary network errors
/// - Per-host concurrent connection limiting via semaphore
/// - Pooled connections with configurable idle limits
/// - HTTP 429 surfaced with its Retry-After hint, never retried
/// - Every call logged with method, URL, outcome and duration
#[derive(Debug)]
pub struct TransportClient {
    client: Client,
    retry: RetryManager,
    host_limits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    config: HttpClientConfig,
}

impl TransportClient {
    /// Create a new transport client
    pub fn new(config: HttpClientConfig, retry: RetryConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("HTTP client: {}", e)))?;

        if config.insecure_skip_verify {
            warn!("TLS certificate verification is disabled");
        }

        Ok(Self::with_client(client, config, retry))
    }

    /// Create a transport client with a custom reqwest Client
    pub fn with_client(client: Client, config: HttpClientConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            retry: RetryManager::new(retry),
            host_limits: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Perform a GET request
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<HttpResponse, TransportError> {
        self.request::<()>(cancel, Method::GET, url, None).await
    }

    /// Perform a POST request with a JSON body
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &B,
    ) -> Result<HttpResponse, TransportError> {
        self.request(cancel, Method::POST, url, Some(body)).await
    }

    /// Perform a PUT request with a JSON body
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &B,
    ) -> Result<HttpResponse, TransportError> {
        self.request(cancel, Method::PUT, url, Some(body)).await
    }

    /// Perform a DELETE request
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<HttpResponse, TransportError> {
        self.request::<()>(cancel, Method::DELETE, url, None).await
    }

    /// Build a request with an optional JSON body and dispatch it
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = PreparedRequest::new(method, url)?;
        if let Some(body) = body {
            request = request.json(body)?;
        }
        self.dispatch(cancel, &request).await
    }

    /// Send a prepared request, retrying per the retry policy
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        request: &PreparedRequest,
    ) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let result = self.dispatch_with_retry(cancel, request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => debug!(
                method = %request.method,
                url = %request.url,
                status = response.status.as_u16(),
                duration_ms,
                "HTTP request completed"
            ),
            Err(TransportError::Cancelled) => debug!(
                method = %request.method,
                url = %request.url,
                duration_ms,
                "HTTP request cancelled"
            ),
            Err(err) => warn!(
                method = %request.method,
                url = %request.url,
                error = %err,
                duration_ms,
                "HTTP request failed"
            ),
        }

        result
    }

    async fn dispatch_with_retry(
        &self,
        cancel: &CancellationToken,
        request: &PreparedRequest,
    ) -> Result<HttpResponse, TransportError> {
        let limiter = self.host_limiter(&extract_host(&request.url)).await;
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            attempt += 1;

            let outcome = {
                let _permit = tokio::select! {
                    permit = limiter.acquire() => permit.map_err(|_| {
                        TransportError::Network("connection limiter closed".to_string())
                    })?,
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                };

                tokio::select! {
                    result = self.send_once(request) => result,
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                }
            };

            let failure = match outcome {
                Ok(response) => {
                    let status = response.status;
                    if !self.retry.should_retry(cancel, Attempt::Response(status))? {
                        return self.finish(request, response);
                    }
                    TransportError::Status {
                        status: status.as_u16(),
                    }
                }
                Err(err) => {
                    if !self.retry.should_retry(cancel, Attempt::Error(&err))? {
                        return Err(err);
                    }
                    err
                }
            };

            if attempt >= max_attempts {
                return Err(TransportError::Exhausted {
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }

            let backoff = self.retry.calculate_backoff(attempt - 1);
            debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "Retrying after transient failure"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            }
        }
    }

    async fn send_once(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Map a final, non-retried response to the call result
    fn finish(
        &self,
        request: &PreparedRequest,
        response: HttpResponse,
    ) -> Result<HttpResponse, TransportError> {
        match response.status {
            status if status.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());

                warn!(
                    url = %request.url,
                    retry_after = ?retry_after,
                    "Rate limited by upstream"
                );
                Err(TransportError::RateLimited { retry_after })
            }
            status => Err(TransportError::Status {
                status: status.as_u16(),
            }),
        }
    }

    async fn host_limiter(&self, host: &str) -> Arc<Semaphore> {
        let mut limits = self.host_limits.lock().await;
        let permits = self.config.max_connections_per_host.max(1);
        limits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(permits)))
            .clone()
    }

    /// Free connection slots for the host of `url`
    pub async fn available_connections(&self, url: &str) -> usize {
        self.host_limiter(&extract_host(url))
            .await
            .available_permits()
    }

    /// Get the retry manager
    pub fn retry(&self) -> &RetryManager {
        &self.retry
    }

    /// Get current configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

/// Extract host (and port) from URL for connection limiting
fn extract_host(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or(url)
        .to_string()
}
