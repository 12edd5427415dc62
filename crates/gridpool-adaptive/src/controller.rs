//! AdaptiveController — grows the pool for unrunnable tasks and shrinks
//! it when the task scheduler retires idle workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use gridpool_cluster::ClusterJobManager;
use gridpool_core::{AdaptiveConfig, JobId, ResourceRequirement, TaskId, WorkerId};

use crate::error::{AdaptError, AdaptResult};
use crate::scheduler::TaskScheduler;

/// A worker serves a task only with this multiple of the task's memory.
pub const SIZING_FACTOR: u64 = 2;

/// What a pass did about unrunnable tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemandAction {
    /// Nothing is unrunnable.
    Idle,
    /// A big enough live job already exists.
    AlreadyRequested { task: TaskId, job_id: JobId },
    /// A new worker was submitted.
    Started { task: TaskId, memory: u64, jobs: Vec<JobId> },
}

/// Summary of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptReport {
    /// `None` when serving unrunnable tasks failed.
    pub demand: Option<DemandAction>,
    pub retired: Vec<WorkerId>,
    /// True when any step logged an error.
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass held the guard.
    Skipped,
    Ran(AdaptReport),
}

/// Holds the `adapting` flag for the duration of a pass.
struct AdaptingGuard<'a>(&'a AtomicBool);

impl<'a> AdaptingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AdaptingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically sizes the worker pool to the task scheduler's demand.
pub struct AdaptiveController {
    scheduler: Arc<dyn TaskScheduler>,
    cluster: Arc<ClusterJobManager>,
    config: AdaptiveConfig,
    adapting: AtomicBool,
}

impl AdaptiveController {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        cluster: Arc<ClusterJobManager>,
        config: AdaptiveConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            cluster,
            config,
            adapting: AtomicBool::new(false),
        })
    }

    pub fn is_adapting(&self) -> bool {
        self.adapting.load(Ordering::Acquire)
    }

    /// Schedule an out-of-band pass on the runtime.
    pub fn adapt_now(self: &Arc<Self>) -> JoinHandle<PassOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.adapt_once().await })
    }

    /// Run one adaptation pass, unless one is already in progress.
    ///
    /// Errors are logged and reported in the outcome; the guard is
    /// released on every path.
    pub async fn adapt_once(&self) -> PassOutcome {
        let Some(_guard) = AdaptingGuard::acquire(&self.adapting) else {
            debug!("adaptation pass already running, skipping");
            return PassOutcome::Skipped;
        };
        debug!("adapting");

        let mut failed = false;

        let demand = match self.serve_unrunnable().await {
            Ok(action) => Some(action),
            Err(e) => {
                error!(error = %e, "failed to serve unrunnable tasks");
                failed = true;
                None
            }
        };

        let retired = match self.retire_workers().await {
            Ok(retired) => retired,
            Err(e) => {
                error!(error = %e, "failed to retire idle workers");
                failed = true;
                Vec::new()
            }
        };

        PassOutcome::Ran(AdaptReport {
            demand,
            retired,
            failed,
        })
    }

    /// Run passes on the configured interval until `shutdown` changes.
    ///
    /// Each tick spawns its pass, so a slow pass never delays the timer;
    /// ticks that land on a running pass are skipped by the guard.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        info!(interval_ms = self.config.interval_ms, "adaptive controller started");

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.adapt_now();
                }
                _ = shutdown.changed() => {
                    info!("adaptive controller shutting down");
                    break;
                }
            }
        }
    }

    /// Make sure the first unrunnable task has a worker coming.
    async fn serve_unrunnable(&self) -> AdaptResult<DemandAction> {
        let Some(task) = self.scheduler.unrunnable_tasks().await.into_iter().next() else {
            return Ok(DemandAction::Idle);
        };

        let memory = self
            .scheduler
            .resource_requirement(&task)
            .await
            .and_then(|r| r.memory)
            .ok_or_else(|| AdaptError::MissingMemory(task.clone()))?;
        let needed = memory.saturating_mul(SIZING_FACTOR);

        // Only live jobs count; held, suspended or finished ones get replaced.
        for job in self.cluster.workers().await {
            if job.memory() >= needed && self.cluster.status(&job.id).await.is_alive() {
                debug!(%task, job_id = %job.id, needed, "worker already requested");
                return Ok(DemandAction::AlreadyRequested {
                    task,
                    job_id: job.id,
                });
            }
        }

        info!(%task, memory = needed, "starting worker for unrunnable task");
        let jobs = self
            .cluster
            .start_workers(1, &ResourceRequirement::with_memory(needed))
            .await?;

        Ok(DemandAction::Started {
            task,
            memory: needed,
            jobs: jobs.into_iter().map(|j| j.id).collect(),
        })
    }

    /// Let the task scheduler retire idle workers and stop their jobs.
    /// Workers outside the pool count as already gone.
    async fn retire_workers(&self) -> AdaptResult<Vec<WorkerId>> {
        let workers = self.scheduler.retire_idle_workers(true, true).await?;
        if !workers.is_empty() {
            let stopped = self.cluster.stop_pooled_workers(&workers).await?;
            info!(?workers, ?stopped, "retired workers");
        }
        Ok(workers)
    }
}
