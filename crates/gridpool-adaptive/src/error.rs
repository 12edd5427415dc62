//! Adaptation error types.

use gridpool_cluster::ClusterError;
use gridpool_core::TaskId;
use thiserror::Error;

/// A failure inside one adaptation pass. Logged, never propagated.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("unrunnable task {0} has no memory requirement")]
    MissingMemory(TaskId),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("task scheduler error: {0}")]
    Scheduler(#[from] anyhow::Error),
}

pub type AdaptResult<T> = Result<T, AdaptError>;
