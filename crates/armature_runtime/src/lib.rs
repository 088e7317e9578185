//! ARMATURE Runtime
//!
//! Concurrency support for the tool worker: a registry of in-flight calls
//! with cooperative cancellation, a semaphore-bounded batch gatherer that
//! keeps partial failures, a process-wide cache of pooled handles, and a
//! single-thread lane for synchronous client libraries.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cache;
pub mod lane;
pub mod monitor;
pub mod tracker;

pub use batch::{BatchOutcome, gather_bounded};
pub use cache::{CacheStats, HandleCache, PooledHandle};
pub use lane::{BlockingLane, LaneError, panic_message};
pub use monitor::{CallMetrics, MetricsSnapshot};
pub use tracker::{ShutdownReport, TaskGuard, TaskTracker, TrackerError};
