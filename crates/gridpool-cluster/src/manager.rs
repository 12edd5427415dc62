//! ClusterJobManager — worker jobs on a batch scheduler.
//!
//! The manager is the only owner of the pool. Jobs enter it after a bulk
//! submission succeeds in full and leave it as soon as their termination
//! is requested, whatever the scheduler answers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use gridpool_core::{ClusterConfig, JobId, JobStatus, ResourceRequirement};
use gridpool_drmaa::{map_job_state, BatchSession, JobControlAction, SessionError};

use crate::error::{ClusterError, ClusterResult};
use crate::registry::{Job, JobRegistry};
use crate::template::build_job_template;

/// Submits, tracks and retires worker jobs through one batch session.
pub struct ClusterJobManager {
    config: ClusterConfig,
    session: Arc<dyn BatchSession>,
    /// Live jobs: job_id → job.
    registry: RwLock<JobRegistry>,
    closed: AtomicBool,
}

impl ClusterJobManager {
    /// Wrap an already opened session.
    pub fn new(config: ClusterConfig, session: Arc<dyn BatchSession>) -> Self {
        info!(job_name = %config.job_name, "cluster job manager initialized");
        Self {
            config,
            session,
            registry: RwLock::new(JobRegistry::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Submit `count` workers as one job array.
    ///
    /// Either all `count` jobs are registered or none are.
    pub async fn start_workers(
        &self,
        count: u32,
        resources: &ResourceRequirement,
    ) -> ClusterResult<Vec<Job>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClusterError::Closed);
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let (template, resolved) =
            build_job_template(self.session.create_job_template(), &self.config, resources);

        let ids = self
            .session
            .run_bulk_jobs(&template, 1, count, 1)
            .await
            .map_err(|e| ClusterError::Submission(e.to_string()))?;

        if ids.len() != count as usize {
            error!(
                requested = count,
                returned = ids.len(),
                "scheduler returned the wrong number of jobs, withdrawing them"
            );
            for id in &ids {
                if let Err(e) = self.session.control(id, JobControlAction::Terminate).await {
                    debug!(job_id = %id, error = %e, "withdraw failed");
                }
            }
            return Err(ClusterError::Submission(format!(
                "requested {count} workers, scheduler returned {} job ids",
                ids.len()
            )));
        }

        let jobs: Vec<Job> = ids
            .iter()
            .map(|id| Job::new(id.clone(), resolved.clone(), template.args.clone()))
            .collect();
        self.registry.write().await.insert_all(jobs.clone());

        let array = ids[0].split('.').next().unwrap_or_default();
        info!(
            count,
            job_id = %array,
            memory = ?resolved.memory,
            cpus = resolved.cpus,
            "started workers"
        );
        Ok(jobs)
    }

    /// Terminate workers and drop them from the pool.
    ///
    /// Each job is terminated on its own; one failure does not stop the
    /// rest. Jobs the scheduler no longer knows count as terminated. With
    /// `sync`, waits until the scheduler has disposed of every job, which
    /// can take arbitrarily long. A failed wait is reported together with
    /// any failed terminations.
    pub async fn stop_workers(&self, ids: &[JobId], sync: bool) -> ClusterResult<()> {
        {
            let mut registry = self.registry.write().await;
            for id in ids {
                registry.remove(id);
            }
        }

        let mut failed = Vec::new();
        for id in ids {
            match self.session.control(id, JobControlAction::Terminate).await {
                Ok(()) => {}
                Err(SessionError::InvalidJob(_)) => {
                    debug!(job_id = %id, "job already gone");
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "failed to terminate job");
                    failed.push(id.clone());
                }
            }
        }
        info!(?ids, "stopped workers");

        let synchronize = if sync {
            self.session.synchronize(ids, true).await.err()
        } else {
            None
        };

        match (failed.is_empty(), synchronize) {
            (true, None) => Ok(()),
            (true, Some(e)) => Err(e.into()),
            (false, synchronize) => Err(ClusterError::Termination {
                failed,
                synchronize,
            }),
        }
    }

    /// Stop those of `ids` that belong to the pool, without waiting for
    /// disposal. Ids the pool never submitted are not sent to the
    /// scheduler. Returns the ids that were stopped.
    pub async fn stop_pooled_workers(&self, ids: &[JobId]) -> ClusterResult<Vec<JobId>> {
        let (pooled, foreign): (Vec<JobId>, Vec<JobId>) = {
            let registry = self.registry.read().await;
            ids.iter().cloned().partition(|id| registry.contains(id))
        };
        if !foreign.is_empty() {
            debug!(?foreign, "ignoring workers outside the pool");
        }
        if !pooled.is_empty() {
            self.stop_workers(&pooled, false).await?;
        }
        Ok(pooled)
    }

    /// Poll the scheduler for one job's state.
    ///
    /// Unknown jobs and failed queries both come back as `InvalidJob`;
    /// query failures are logged.
    pub async fn status(&self, id: &str) -> JobStatus {
        let status = match self.session.job_status(id).await {
            Ok(code) => map_job_state(code),
            Err(SessionError::InvalidJob(_)) => JobStatus::InvalidJob,
            Err(e) => {
                warn!(job_id = %id, error = %e, "job status query failed");
                JobStatus::InvalidJob
            }
        };
        self.registry.write().await.set_status(id, status);
        status
    }

    /// Poll every job in the pool.
    pub async fn refresh_statuses(&self) -> Vec<(JobId, JobStatus)> {
        let ids = self.registry.read().await.ids();
        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            let status = self.status(&id).await;
            statuses.push((id, status));
        }
        statuses
    }

    /// Snapshot of the pool.
    pub async fn workers(&self) -> Vec<Job> {
        self.registry.read().await.jobs().cloned().collect()
    }

    pub async fn worker_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Terminate every remaining worker, wait for disposal and release the
    /// session. Safe to call more than once; never fails.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("cluster job manager already closed");
            return;
        }

        let ids = self.registry.read().await.ids();
        if !ids.is_empty()
            && let Err(e) = self.stop_workers(&ids, true).await
        {
            warn!(error = %e, "errors while stopping workers on close");
        }

        match self.session.exit().await {
            Ok(()) => info!("batch session released"),
            Err(SessionError::NoActiveSession) => debug!("batch session was already released"),
            Err(e) => warn!(error = %e, "failed to release batch session"),
        }
    }
}

impl fmt::Display for ClusterJobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.registry.try_read() {
            Ok(registry) => write!(f, "<ClusterJobManager: {} workers>", registry.len()),
            Err(_) => write!(f, "<ClusterJobManager: ? workers>"),
        }
    }
}

impl Drop for ClusterJobManager {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let ids = self.registry.get_mut().ids();
        let session = self.session.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(best_effort_shutdown(session, ids));
            }
            Err(_) => {
                warn!(
                    workers = ids.len(),
                    "cluster job manager dropped outside a runtime without close(); jobs may keep running"
                );
            }
        }
    }
}

/// Cleanup for a manager dropped without `close()`. Logs, never fails.
async fn best_effort_shutdown(session: Arc<dyn BatchSession>, ids: Vec<JobId>) {
    for id in &ids {
        if let Err(e) = session.control(id, JobControlAction::Terminate).await
            && !matches!(e, SessionError::InvalidJob(_))
        {
            warn!(job_id = %id, error = %e, "failed to terminate job during drop");
        }
    }
    if let Err(e) = session.exit().await
        && !matches!(e, SessionError::NoActiveSession)
    {
        warn!(error = %e, "failed to release batch session during drop");
    }
}
