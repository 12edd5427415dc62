//! The `BatchSession` trait and job templates.

use async_trait::async_trait;

use gridpool_core::{JobId, JobStatus};

use crate::error::SessionResult;

/// DRMAA job state code as reported by the scheduler.
pub type NativeJobState = u32;

/// DRMAA job state codes.
pub mod state {
    use super::NativeJobState;

    pub const UNDETERMINED: NativeJobState = 0x00;
    pub const QUEUED_ACTIVE: NativeJobState = 0x10;
    pub const SYSTEM_ON_HOLD: NativeJobState = 0x11;
    pub const USER_ON_HOLD: NativeJobState = 0x12;
    pub const USER_SYSTEM_ON_HOLD: NativeJobState = 0x13;
    pub const RUNNING: NativeJobState = 0x20;
    pub const SYSTEM_SUSPENDED: NativeJobState = 0x21;
    pub const USER_SUSPENDED: NativeJobState = 0x22;
    pub const DONE: NativeJobState = 0x30;
    pub const FAILED: NativeJobState = 0x40;
}

/// Fold a native state code into a [`JobStatus`].
///
/// Total: codes outside the DRMAA table map to `InvalidJob`.
pub fn map_job_state(code: NativeJobState) -> JobStatus {
    match code {
        state::UNDETERMINED => JobStatus::Undetermined,
        state::QUEUED_ACTIVE => JobStatus::QueuedActive,
        state::SYSTEM_ON_HOLD => JobStatus::SystemOnHold,
        state::USER_ON_HOLD => JobStatus::UserOnHold,
        state::USER_SYSTEM_ON_HOLD => JobStatus::UserSystemOnHold,
        state::RUNNING => JobStatus::Running,
        state::SYSTEM_SUSPENDED => JobStatus::SystemSuspended,
        state::USER_SUSPENDED => JobStatus::UserSuspended,
        state::DONE => JobStatus::Done,
        state::FAILED => JobStatus::Failed,
        _ => JobStatus::InvalidJob,
    }
}

/// Job control actions. Only termination is used by gridpool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControlAction {
    Terminate,
}

/// Description of the process to launch for each job of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTemplate {
    pub job_name: String,
    pub remote_command: String,
    pub args: Vec<String>,
    pub output_path: String,
    pub error_path: String,
    pub working_directory: String,
    /// Scheduler-specific flags, passed through untouched.
    pub native_specification: String,
}

/// One open session with a batch scheduler.
#[async_trait]
pub trait BatchSession: Send + Sync {
    /// Start a new, empty job template.
    fn create_job_template(&self) -> JobTemplate {
        JobTemplate::default()
    }

    /// Submit tasks `start..=end` (stepping by `step`) of `template` as one
    /// job array. Returns one id per task.
    async fn run_bulk_jobs(
        &self,
        template: &JobTemplate,
        start: u32,
        end: u32,
        step: u32,
    ) -> SessionResult<Vec<JobId>>;

    /// Fails with `SessionError::InvalidJob` for unknown ids.
    async fn control(&self, id: &str, action: JobControlAction) -> SessionResult<()>;

    /// Fails with `SessionError::InvalidJob` for unknown ids.
    async fn job_status(&self, id: &str) -> SessionResult<NativeJobState>;

    /// Wait until every job in `ids` has finished. With `dispose`, the
    /// scheduler may forget them afterwards.
    async fn synchronize(&self, ids: &[JobId], dispose: bool) -> SessionResult<()>;

    /// Release the session. A second call fails with `NoActiveSession`.
    async fn exit(&self) -> SessionResult<()>;
}
