//! Outbound HTTP transport
//!
//! # Components
//!
//! - [`retry`]: retry classification and exponential backoff
//! - [`client`]: pooled HTTP client that applies the retry policy to every verb
//!
//! # Example
//!
//! ```ignore
//! use sync_core::config::{HttpClientConfig, RetryConfig};
//! use sync_core::transport::TransportClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = TransportClient::new(HttpClientConfig::default(), RetryConfig::default())?;
//! let cancel = CancellationToken::new();
//! let response = client.get(&cancel, "https://example.com/api/items").await?;
//! ```

pub mod client;
pub mod retry;

pub use client::{HttpResponse, PreparedRequest, TransportClient};
pub use retry::{Attempt, RetryManager, RetryPolicy};
