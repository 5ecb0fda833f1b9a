//! sync-core - Concurrent request execution for sync agents
//!
//! This crate provides the pieces a sync agent needs to talk to rate-limited,
//! unreliable HTTP and GraphQL APIs: a retrying transport, a bounded-concurrency
//! batch executor, a GraphQL batch client, a persisted sync state, and the
//! policy deciding between incremental and full synchronization.

pub mod batch;
pub mod config;
pub mod error;
pub mod graphql;
pub mod planner;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod transport;
