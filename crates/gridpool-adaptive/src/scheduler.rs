//! The task scheduler as seen by the controller.

use async_trait::async_trait;

use gridpool_core::{ResourceRequirement, TaskId, WorkerId};

/// The process that hands tasks to workers.
///
/// Workers started by gridpool register under their batch job id, so the
/// `WorkerId`s returned by [`retire_idle_workers`](Self::retire_idle_workers)
/// are job ids the cluster manager can terminate.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Tasks no current worker can satisfy. The first entry is the one
    /// served next.
    async fn unrunnable_tasks(&self) -> Vec<TaskId>;

    async fn resource_requirement(&self, task: &str) -> Option<ResourceRequirement>;

    /// Retire workers the scheduler considers idle. `remove` drops them
    /// from its bookkeeping, `close` shuts their processes down.
    async fn retire_idle_workers(&self, remove: bool, close: bool) -> anyhow::Result<Vec<WorkerId>>;
}
