//! GraphQL batch client
//!
//! - [`types`]: request/response envelopes and structured errors
//! - [`client`]: array-body submission over the batch executor

pub mod client;
pub mod types;

pub use client::GraphQLBatchClient;
pub use types::{GraphQLError, GraphQLRequest, GraphQLResponse, Location, PathSegment};
