//! Domain types shared across gridpool crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job identifier assigned by the batch scheduler (e.g. `"4711.3"`).
pub type JobId = String;

/// Key of a task tracked by the task scheduler.
pub type TaskId = String;

/// Name a worker registered with on the task scheduler.
pub type WorkerId = String;

// ── Job status ────────────────────────────────────────────────────

/// Last known state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Undetermined,
    QueuedActive,
    SystemOnHold,
    UserOnHold,
    UserSystemOnHold,
    Running,
    SystemSuspended,
    UserSuspended,
    Done,
    Failed,
    /// The batch scheduler does not know the job (anymore).
    InvalidJob,
}

impl JobStatus {
    /// True when the job is up or on its way up.
    pub fn is_alive(self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::QueuedActive)
    }

    /// True once the job can no longer change state.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::InvalidJob
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Undetermined => "UNDETERMINED",
            JobStatus::QueuedActive => "QUEUED_ACTIVE",
            JobStatus::SystemOnHold => "SYSTEM_ON_HOLD",
            JobStatus::UserOnHold => "USER_ON_HOLD",
            JobStatus::UserSystemOnHold => "USER_SYSTEM_ON_HOLD",
            JobStatus::Running => "RUNNING",
            JobStatus::SystemSuspended => "SYSTEM_SUSPENDED",
            JobStatus::UserSuspended => "USER_SUSPENDED",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
            JobStatus::InvalidJob => "INVALID_JOB",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// Per-job launch resources.
///
/// `None` fields fall back to the cluster defaults when the job template
/// is built; the resolved value is what gets recorded on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Memory in bytes.
    pub memory: Option<u64>,
    /// Threads per worker. Zero leaves the worker's default.
    pub cpus: u32,
    /// Share of `memory` the worker may use before it self-limits.
    pub memory_fraction: Option<f64>,
}

impl ResourceRequirement {
    /// A requirement for `memory` bytes on one cpu.
    pub fn with_memory(memory: u64) -> Self {
        Self {
            memory: Some(memory),
            ..Self::default()
        }
    }
}

impl Default for ResourceRequirement {
    fn default() -> Self {
        Self {
            memory: None,
            cpus: 1,
            memory_fraction: None,
        }
    }
}
