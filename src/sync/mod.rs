//! Sync run orchestration
//!
//! # Components
//!
//! - [`coordinator`]: one run from state load to state save around a [`SyncSource`]
//! - [`scheduler`]: periodic runs with jitter, timeouts and manual triggers
//!
//! # Example
//!
//! ```ignore
//! use sync_core::planner::SyncPlanner;
//! use sync_core::state::SyncStateStore;
//! use sync_core::sync::{SyncCoordinator, SyncScheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = SyncStateStore::new("sync_state.json");
//! let coordinator = SyncCoordinator::new(source, store, SyncPlanner::default());
//! let outcome = coordinator.run(&CancellationToken::new()).await?;
//! ```

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{RunOutcome, SyncCoordinator, SyncReport, SyncSource};
pub use scheduler::{ManualSyncHandle, SchedulerStatus, SyncScheduler};
