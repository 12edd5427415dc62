//! Cluster manager error types.

use gridpool_core::JobId;
use gridpool_drmaa::SessionError;
use thiserror::Error;

/// Errors surfaced by explicit cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The scheduler refused a bulk submission; nothing was registered.
    #[error("worker submission failed: {0}")]
    Submission(String),

    /// Termination requests that failed for reasons other than the job
    /// being unknown. The jobs are no longer tracked either way.
    /// `synchronize` holds the error of a later disposal wait, if any.
    #[error(
        "failed to terminate jobs: {}{}",
        failed.join(", "),
        synchronize.as_ref().map(|e| format!(" (synchronize: {e})")).unwrap_or_default()
    )]
    Termination {
        failed: Vec<JobId>,
        synchronize: Option<SessionError>,
    },

    #[error("cluster manager is closed")]
    Closed,

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
