//! Error types for sync-core
//!
//! This module defines the error taxonomy shared by the transport, batch,
//! GraphQL, state and coordination layers. All error types use `thiserror`.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced while sending a request through the transport client
///
/// These are values: the batch executor attaches them to individual results
/// instead of failing the whole batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The governing cancellation token fired
    #[error("Request cancelled")]
    Cancelled,

    /// The request or connection timed out
    #[error("Network timeout")]
    Timeout,

    /// The connection was reset or aborted by the peer
    #[error("Connection reset")]
    ConnectionReset,

    /// The peer closed the stream before the response completed
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Host name resolution failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// TLS handshake or certificate validation failed
    #[error("TLS handshake failed: {0}")]
    Tls(String),

    /// The remote host refused the connection
    #[error("Connection refused")]
    ConnectionRefused,

    /// Any other network-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The request could not be built (bad URL, header or body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream answered 429
    #[error("Rate limited by upstream (retry after {retry_after:?} seconds)")]
    RateLimited {
        /// Parsed `Retry-After` hint in seconds, if the upstream sent one
        retry_after: Option<u64>,
    },

    /// Upstream answered with a terminal non-2xx status
    #[error("Upstream returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Every allowed attempt failed with a retryable outcome
    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// Outcome of the final attempt
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Classify a reqwest error into a transport error
    ///
    /// Walks the source chain looking for I/O error kinds and the DNS, TLS and
    /// end-of-stream markers produced by hyper and the resolver.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            return TransportError::InvalidRequest(err.to_string());
        }
        if err.is_timeout() {
            return TransportError::Timeout;
        }

        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::TimedOut => return TransportError::Timeout,
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe => return TransportError::ConnectionReset,
                    std::io::ErrorKind::UnexpectedEof => return TransportError::UnexpectedEof,
                    std::io::ErrorKind::ConnectionRefused => {
                        return TransportError::ConnectionRefused
                    }
                    _ => {}
                }
            }

            let text = cause.to_string().to_lowercase();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return TransportError::Dns(cause.to_string());
            }
            if text.contains("tls") || text.contains("certificate") || text.contains("handshake")
            {
                return TransportError::Tls(cause.to_string());
            }
            if text.contains("connection closed before message completed")
                || text.contains("unexpected eof")
                || text.contains("end of file")
            {
                return TransportError::UnexpectedEof;
            }
            if text.contains("connection reset") {
                return TransportError::ConnectionReset;
            }

            source = cause.source();
        }

        TransportError::Network(err.to_string())
    }

    /// Returns true for network failures worth another attempt
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout
                | TransportError::ConnectionReset
                | TransportError::UnexpectedEof
                | TransportError::Dns(_)
                | TransportError::Tls(_)
        )
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::RateLimited { .. } => Some(429),
            TransportError::Status { status } => Some(*status),
            TransportError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Whole-call failures of a GraphQL batch submission
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphQLBatchError {
    /// No documents were submitted
    #[error("GraphQL batch is empty")]
    EmptyBatch,

    /// The HTTP transaction itself failed
    #[error("GraphQL transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response array does not match the request array
    #[error("GraphQL response count mismatch: sent {expected}, received {actual}")]
    CountMismatch {
        /// Number of documents sent
        expected: usize,
        /// Number of responses received
        actual: usize,
    },

    /// The response body is not a valid GraphQL response envelope
    #[error("Invalid GraphQL response: {0}")]
    InvalidResponse(String),

    /// The request documents could not be encoded
    #[error("Failed to encode GraphQL request: {0}")]
    Encode(String),
}

/// Sync state persistence errors
///
/// Always fatal to the current run.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state file failed
    #[error("State file I/O error at {}: {source}", path.display())]
    Io {
        /// Path of the state file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but cannot be parsed
    #[error("State file {} is corrupt: {message}", path.display())]
    Corrupt {
        /// Path of the state file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The state could not be serialized
    #[error("Failed to serialize sync state: {0}")]
    Serialize(String),

    /// The state violates an invariant
    #[error("Invalid sync state: {0}")]
    Invalid(String),
}

/// Errors reported by a sync source while processing a run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    /// A transport failure aborted the source's work
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A GraphQL submission failed as a whole
    #[error("GraphQL error: {0}")]
    GraphQL(#[from] GraphQLBatchError),

    /// Upstream data could not be interpreted
    #[error("Invalid upstream data: {0}")]
    InvalidData(String),

    /// The run was cancelled before the source finished
    #[error("Sync cancelled")]
    Cancelled,

    /// The run exceeded its time budget
    #[error("Sync timed out after {0} seconds")]
    TimedOut(u64),
}

/// Application-level error type
///
/// Aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// GraphQL batch error
    #[error("GraphQL error: {0}")]
    GraphQL(#[from] GraphQLBatchError),

    /// State persistence error
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Sync source error
    #[error("Sync source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
