//! Adaptive controller scenarios against an in-memory grid and a scripted
//! task scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use gridpool_adaptive::*;
use gridpool_cluster::ClusterJobManager;
use gridpool_core::*;
use gridpool_drmaa::{state, BatchSession, MemorySession};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Default)]
struct FakeScheduler {
    unrunnable: Mutex<Vec<TaskId>>,
    requirements: Mutex<HashMap<TaskId, ResourceRequirement>>,
    to_retire: Mutex<Vec<WorkerId>>,
    retire_calls: AtomicUsize,
    fail_retire: AtomicBool,
    /// Signalled when a pass reaches retirement.
    entered: Notify,
    /// When set, retirement waits for this before returning.
    gate: Option<Arc<Notify>>,
}

impl FakeScheduler {
    fn with_task(task: &str, memory: Option<u64>) -> Self {
        let scheduler = Self::default();
        scheduler.add_task(task, memory);
        scheduler
    }

    fn add_task(&self, task: &str, memory: Option<u64>) {
        self.unrunnable.lock().unwrap().push(task.to_string());
        self.requirements.lock().unwrap().insert(
            task.to_string(),
            ResourceRequirement {
                memory,
                ..ResourceRequirement::default()
            },
        );
    }

    fn clear_tasks(&self) {
        self.unrunnable.lock().unwrap().clear();
    }

    fn retire_next(&self, workers: &[&str]) {
        *self.to_retire.lock().unwrap() = workers.iter().map(|w| w.to_string()).collect();
    }

    fn retire_calls(&self) -> usize {
        self.retire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskScheduler for FakeScheduler {
    async fn unrunnable_tasks(&self) -> Vec<TaskId> {
        self.unrunnable.lock().unwrap().clone()
    }

    async fn resource_requirement(&self, task: &str) -> Option<ResourceRequirement> {
        self.requirements.lock().unwrap().get(task).cloned()
    }

    async fn retire_idle_workers(&self, remove: bool, close: bool) -> anyhow::Result<Vec<WorkerId>> {
        assert!(remove && close);
        self.retire_calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_retire.load(Ordering::SeqCst) {
            anyhow::bail!("scheduler unreachable");
        }
        Ok(std::mem::take(&mut *self.to_retire.lock().unwrap()))
    }
}

struct Harness {
    session: Arc<MemorySession>,
    cluster: Arc<ClusterJobManager>,
    scheduler: Arc<FakeScheduler>,
    controller: Arc<AdaptiveController>,
}

fn harness(scheduler: FakeScheduler) -> Harness {
    harness_with_interval(scheduler, 1000)
}

fn harness_with_interval(scheduler: FakeScheduler, interval_ms: u64) -> Harness {
    let session = Arc::new(MemorySession::new());
    let config = ClusterConfig {
        remote_command: "/opt/bin/worker".to_string(),
        ..ClusterConfig::default()
    };
    let cluster = Arc::new(ClusterJobManager::new(config, session.clone()));
    let scheduler = Arc::new(scheduler);
    let controller = AdaptiveController::new(
        scheduler.clone(),
        cluster.clone(),
        AdaptiveConfig { interval_ms },
    );
    Harness {
        session,
        cluster,
        scheduler,
        controller,
    }
}

fn report(outcome: PassOutcome) -> AdaptReport {
    match outcome {
        PassOutcome::Ran(report) => report,
        PassOutcome::Skipped => panic!("pass was skipped"),
    }
}

#[tokio::test]
async fn idle_scheduler_changes_nothing() {
    let h = harness(FakeScheduler::default());

    let report = report(h.controller.adapt_once().await);
    assert_eq!(report.demand, Some(DemandAction::Idle));
    assert!(report.retired.is_empty());
    assert!(!report.failed);
    assert!(h.session.templates().is_empty());
    assert_eq!(h.scheduler.retire_calls(), 1);
}

#[tokio::test]
async fn unrunnable_task_gets_one_worker_of_twice_its_memory() {
    let h = harness(FakeScheduler::with_task("load-shard-7", Some(4 * GIB)));

    let report = report(h.controller.adapt_once().await);
    let jobs = match report.demand {
        Some(DemandAction::Started { task, memory, jobs }) => {
            assert_eq!(task, "load-shard-7");
            assert_eq!(memory, 8 * GIB);
            jobs
        }
        other => panic!("expected a submission, got {other:?}"),
    };
    assert_eq!(jobs.len(), 1);

    let workers = h.cluster.workers().await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].resources.memory, Some(8 * GIB));
    let advertised = ((8 * GIB) as f64 * 0.8).round() as u64;
    assert!(workers[0].args.contains(&format!("memory={advertised}")));

    // The worker comes up; the same demand must not trigger another one.
    h.session.set_state(&jobs[0], state::RUNNING);
    let report2 = match h.controller.adapt_once().await {
        PassOutcome::Ran(r) => r,
        PassOutcome::Skipped => panic!("pass was skipped"),
    };
    assert_eq!(
        report2.demand,
        Some(DemandAction::AlreadyRequested {
            task: "load-shard-7".to_string(),
            job_id: jobs[0].clone(),
        })
    );
    assert_eq!(h.session.templates().len(), 1);
    assert_eq!(h.cluster.worker_count().await, 1);
}

#[tokio::test]
async fn queued_worker_counts_as_requested() {
    let h = harness(FakeScheduler::with_task("t", Some(GIB)));

    report(h.controller.adapt_once().await);
    // Still QUEUED_ACTIVE in the memory session.
    let second = report(h.controller.adapt_once().await);
    assert!(matches!(second.demand, Some(DemandAction::AlreadyRequested { .. })));
    assert_eq!(h.session.templates().len(), 1);
}

#[tokio::test]
async fn worker_at_one_point_nine_times_is_not_enough() {
    let memory = 10_000_000_000;
    let h = harness(FakeScheduler::with_task("t", Some(memory)));

    let small = h
        .cluster
        .start_workers(1, &ResourceRequirement::with_memory(19_000_000_000))
        .await
        .unwrap();
    h.session.set_state(&small[0].id, state::RUNNING);

    let report = report(h.controller.adapt_once().await);
    assert!(matches!(
        report.demand,
        Some(DemandAction::Started { memory: 20_000_000_000, .. })
    ));
    assert_eq!(h.cluster.worker_count().await, 2);
}

#[tokio::test]
async fn worker_at_exactly_twice_is_enough() {
    let memory = 10_000_000_000;
    let h = harness(FakeScheduler::with_task("t", Some(memory)));

    let exact = h
        .cluster
        .start_workers(1, &ResourceRequirement::with_memory(20_000_000_000))
        .await
        .unwrap();
    h.session.set_state(&exact[0].id, state::RUNNING);

    let report = report(h.controller.adapt_once().await);
    assert_eq!(
        report.demand,
        Some(DemandAction::AlreadyRequested {
            task: "t".to_string(),
            job_id: exact[0].id.clone(),
        })
    );
    assert_eq!(h.cluster.worker_count().await, 1);
}

#[tokio::test]
async fn held_or_dead_workers_are_replaced() {
    let h = harness(FakeScheduler::with_task("t", Some(GIB)));

    for code in [state::USER_ON_HOLD, state::SYSTEM_SUSPENDED, state::FAILED] {
        let jobs = h
            .cluster
            .start_workers(1, &ResourceRequirement::with_memory(4 * GIB))
            .await
            .unwrap();
        h.session.set_state(&jobs[0].id, code);
    }

    let report = report(h.controller.adapt_once().await);
    assert!(matches!(report.demand, Some(DemandAction::Started { .. })));
    assert_eq!(h.cluster.worker_count().await, 4);
}

#[tokio::test]
async fn only_first_unrunnable_task_is_served() {
    let scheduler = FakeScheduler::with_task("first", Some(GIB));
    scheduler.add_task("second", Some(16 * GIB));
    let h = harness(scheduler);

    let report = report(h.controller.adapt_once().await);
    assert!(matches!(
        report.demand,
        Some(DemandAction::Started { ref task, memory, .. }) if task == "first" && memory == 2 * GIB
    ));
    assert_eq!(h.session.templates().len(), 1);
}

#[tokio::test]
async fn retired_workers_are_terminated() {
    let h = harness(FakeScheduler::default());
    let jobs = h
        .cluster
        .start_workers(2, &ResourceRequirement::default())
        .await
        .unwrap();
    h.scheduler.retire_next(&[jobs[0].id.as_str(), "tcp://10.0.0.9:4000"]);

    let report = report(h.controller.adapt_once().await);
    assert_eq!(report.retired.len(), 2);
    assert!(!report.failed);

    let remaining: Vec<JobId> = h.cluster.workers().await.into_iter().map(|j| j.id).collect();
    assert_eq!(remaining, vec![jobs[1].id.clone()]);
    let controlled: Vec<JobId> = h.session.controls().into_iter().map(|(id, _)| id).collect();
    assert_eq!(controlled, vec![jobs[0].id.clone()]);
    assert!(h.session.synchronized().is_empty());
}

#[tokio::test]
async fn retiring_a_foreign_worker_leaves_its_job_running() {
    let h = harness(FakeScheduler::default());
    // A job on the same grid that this pool never submitted.
    h.session.set_state("10.1", state::RUNNING);
    h.scheduler.retire_next(&["10.1"]);

    let report = report(h.controller.adapt_once().await);
    assert_eq!(report.retired, vec!["10.1".to_string()]);
    assert!(!report.failed);
    assert!(h.session.controls().is_empty());
    assert_eq!(h.session.job_status("10.1").await.unwrap(), state::RUNNING);
}

#[tokio::test]
async fn overlapping_passes_run_once() {
    let gate = Arc::new(Notify::new());
    let scheduler = FakeScheduler {
        gate: Some(gate.clone()),
        ..FakeScheduler::default()
    };
    let h = harness(scheduler);

    let first = h.controller.adapt_now();
    h.scheduler.entered.notified().await;
    assert!(h.controller.is_adapting());

    assert_eq!(h.controller.adapt_once().await, PassOutcome::Skipped);
    let second = h.controller.adapt_now().await.unwrap();
    assert_eq!(second, PassOutcome::Skipped);

    gate.notify_one();
    assert!(matches!(first.await.unwrap(), PassOutcome::Ran(_)));
    assert_eq!(h.scheduler.retire_calls(), 1);
    assert!(!h.controller.is_adapting());
}

#[tokio::test]
async fn failed_pass_releases_guard() {
    let h = harness(FakeScheduler::with_task("no-memory", None));
    h.scheduler.fail_retire.store(true, Ordering::SeqCst);

    let report1 = report(h.controller.adapt_once().await);
    assert!(report1.failed);
    assert_eq!(report1.demand, None);
    assert!(report1.retired.is_empty());
    assert!(!h.controller.is_adapting());

    h.scheduler.fail_retire.store(false, Ordering::SeqCst);
    h.scheduler.clear_tasks();
    let report2 = report(h.controller.adapt_once().await);
    assert!(!report2.failed);
    assert_eq!(report2.demand, Some(DemandAction::Idle));
    assert_eq!(h.scheduler.retire_calls(), 2);
}

#[tokio::test]
async fn rejected_submission_still_retires() {
    let h = harness(FakeScheduler::with_task("t", Some(GIB)));
    h.session.reject_submissions("queue disabled");

    let report = report(h.controller.adapt_once().await);
    assert!(report.failed);
    assert_eq!(report.demand, None);
    assert_eq!(h.scheduler.retire_calls(), 1);
    assert_eq!(h.cluster.worker_count().await, 0);

    h.session.accept_submissions();
    let report = match h.controller.adapt_once().await {
        PassOutcome::Ran(r) => r,
        PassOutcome::Skipped => panic!("pass was skipped"),
    };
    assert!(matches!(report.demand, Some(DemandAction::Started { .. })));
}

#[tokio::test]
async fn run_loop_ticks_until_shutdown() {
    let h = harness_with_interval(FakeScheduler::default(), 10);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(h.controller.clone().run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.scheduler.retire_calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("controller never ticked");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller did not stop")
        .unwrap();
}

#[tokio::test]
async fn close_after_adaptation_cleans_up() {
    let h = harness(FakeScheduler::with_task("t", Some(GIB)));
    report(h.controller.adapt_once().await);
    assert_eq!(h.cluster.worker_count().await, 1);

    h.cluster.close().await;
    assert_eq!(h.cluster.worker_count().await, 0);
    assert!(!h.session.is_active());
    assert!(h.session.exit().await.is_err());
}
