//! gridpool-adaptive — demand-driven worker pool sizing.
//!
//! The [`AdaptiveController`] wakes up on a fixed interval, looks at the
//! task scheduler's unrunnable tasks and the cluster's pool, and asks the
//! [`ClusterJobManager`](gridpool_cluster::ClusterJobManager) for more or
//! fewer workers.
//!
//! # Adaptation pass
//!
//! ```text
//! if another pass is running: skip
//! if some task is unrunnable:
//!     need = 2 * task.memory
//!     if no pooled job has memory >= need and is RUNNING or QUEUED_ACTIVE:
//!         start_workers(1, memory = need)
//! retired = scheduler.retire_idle_workers()
//! stop the retired workers that are in the pool
//! ```
//!
//! Only the first unrunnable task is served per pass; further resource
//! classes wait for later passes.

pub mod controller;
pub mod error;
pub mod scheduler;

pub use controller::{AdaptReport, AdaptiveController, DemandAction, PassOutcome, SIZING_FACTOR};
pub use error::AdaptError;
pub use scheduler::TaskScheduler;
