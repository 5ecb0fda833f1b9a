//! Batch execution of independent HTTP requests
//!
//! - [`request`]: request/response descriptors and result summaries
//! - [`executor`]: worker pool with a concurrency ceiling and pacing floor

pub mod executor;
pub mod request;

pub use executor::BatchExecutor;
pub use request::{sort_by_submission, BatchRequest, BatchResponse, BatchSummary};
