//! In-process batch session.
//!
//! Keeps job bookkeeping in memory instead of talking to a grid. Job ids
//! look like SGE array tasks (`"<array>.<task>"`). Callers can script
//! job states and failures, which makes it the session of choice for
//! tests and `--dry-run`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use gridpool_core::JobId;

use crate::error::{SessionError, SessionResult};
use crate::session::{state, BatchSession, JobControlAction, JobTemplate, NativeJobState};

#[derive(Default)]
struct Inner {
    active: bool,
    next_array: u64,
    jobs: BTreeMap<JobId, NativeJobState>,
    templates: Vec<JobTemplate>,
    controls: Vec<(JobId, JobControlAction)>,
    synchronized: Vec<Vec<JobId>>,
    reject_reason: Option<String>,
    missing_ids: usize,
    failing_controls: HashSet<JobId>,
    synchronize_error: Option<String>,
    exit_calls: u32,
}

/// A [`BatchSession`] backed by a map of job states.
pub struct MemorySession {
    inner: Mutex<Inner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                active: true,
                next_array: 1,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning only happens if a test panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the native state of a job, creating it if needed.
    pub fn set_state(&self, id: &str, code: NativeJobState) {
        self.lock().jobs.insert(id.to_string(), code);
    }

    /// Drop a job from the scheduler's bookkeeping, as if it completed
    /// and was disposed.
    pub fn forget(&self, id: &str) {
        self.lock().jobs.remove(id);
    }

    /// Reject every following submission with `reason`.
    pub fn reject_submissions(&self, reason: &str) {
        self.lock().reject_reason = Some(reason.to_string());
    }

    pub fn accept_submissions(&self) {
        self.lock().reject_reason = None;
    }

    /// Make the next submission return `n` fewer ids than requested.
    pub fn drop_ids_on_next_submission(&self, n: usize) {
        self.lock().missing_ids = n;
    }

    /// Make termination of `id` fail with a command error.
    pub fn fail_control(&self, id: &str) {
        self.lock().failing_controls.insert(id.to_string());
    }

    /// Make every following `synchronize` fail with a command error.
    pub fn fail_synchronize(&self, reason: &str) {
        self.lock().synchronize_error = Some(reason.to_string());
    }

    /// Templates of all accepted submissions, oldest first.
    pub fn templates(&self) -> Vec<JobTemplate> {
        self.lock().templates.clone()
    }

    /// Every control request received, including failed ones.
    pub fn controls(&self) -> Vec<(JobId, JobControlAction)> {
        self.lock().controls.clone()
    }

    /// Id lists passed to `synchronize`, oldest first.
    pub fn synchronized(&self) -> Vec<Vec<JobId>> {
        self.lock().synchronized.clone()
    }

    /// Ids the scheduler currently knows about.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.lock().jobs.keys().cloned().collect()
    }

    pub fn exit_calls(&self) -> u32 {
        self.lock().exit_calls
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchSession for MemorySession {
    async fn run_bulk_jobs(
        &self,
        template: &JobTemplate,
        start: u32,
        end: u32,
        step: u32,
    ) -> SessionResult<Vec<JobId>> {
        let mut inner = self.lock();
        if !inner.active {
            return Err(SessionError::NoActiveSession);
        }
        if let Some(reason) = &inner.reject_reason {
            return Err(SessionError::Rejected(reason.clone()));
        }
        if step == 0 || start == 0 || end < start {
            return Err(SessionError::Rejected(format!(
                "invalid task range {start}-{end}:{step}"
            )));
        }

        let array = inner.next_array;
        inner.next_array += 1;

        let mut ids: Vec<JobId> = (start..=end)
            .step_by(step as usize)
            .map(|task| format!("{array}.{task}"))
            .collect();
        let missing = std::mem::take(&mut inner.missing_ids);
        ids.truncate(ids.len().saturating_sub(missing));

        for id in &ids {
            inner.jobs.insert(id.clone(), state::QUEUED_ACTIVE);
        }
        inner.templates.push(template.clone());
        debug!(array, tasks = ids.len(), "memory session accepted bulk submission");
        Ok(ids)
    }

    async fn control(&self, id: &str, action: JobControlAction) -> SessionResult<()> {
        let mut inner = self.lock();
        if !inner.active {
            return Err(SessionError::NoActiveSession);
        }
        inner.controls.push((id.to_string(), action));
        if inner.failing_controls.contains(id) {
            return Err(SessionError::Command(format!("cannot terminate {id}")));
        }
        match inner.jobs.get_mut(id) {
            Some(code) => {
                match action {
                    JobControlAction::Terminate => *code = state::FAILED,
                }
                Ok(())
            }
            None => Err(SessionError::InvalidJob(id.to_string())),
        }
    }

    async fn job_status(&self, id: &str) -> SessionResult<NativeJobState> {
        let inner = self.lock();
        if !inner.active {
            return Err(SessionError::NoActiveSession);
        }
        inner
            .jobs
            .get(id)
            .copied()
            .ok_or_else(|| SessionError::InvalidJob(id.to_string()))
    }

    // Nothing runs here, so every job counts as finished once asked about.
    async fn synchronize(&self, ids: &[JobId], dispose: bool) -> SessionResult<()> {
        let mut inner = self.lock();
        if !inner.active {
            return Err(SessionError::NoActiveSession);
        }
        inner.synchronized.push(ids.to_vec());
        if let Some(reason) = &inner.synchronize_error {
            return Err(SessionError::Command(reason.clone()));
        }
        if dispose {
            for id in ids {
                inner.jobs.remove(id);
            }
        }
        Ok(())
    }

    async fn exit(&self) -> SessionResult<()> {
        let mut inner = self.lock();
        inner.exit_calls += 1;
        if !inner.active {
            return Err(SessionError::NoActiveSession);
        }
        inner.active = false;
        Ok(())
    }
}
