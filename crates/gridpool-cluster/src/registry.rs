//! The pool of submitted jobs.

use std::collections::BTreeMap;

use gridpool_core::{JobId, JobStatus, ResourceRequirement};

/// A worker job submitted to the batch scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Resources the job was launched with, defaults already applied.
    pub resources: ResourceRequirement,
    /// Last polled state. `Undetermined` until the first poll.
    pub status: JobStatus,
    /// Worker process arguments.
    pub args: Vec<String>,
}

impl Job {
    pub fn new(id: JobId, resources: ResourceRequirement, args: Vec<String>) -> Self {
        Self {
            id,
            resources,
            status: JobStatus::Undetermined,
            args,
        }
    }

    /// Memory the job was sized for, zero when none was requested.
    pub fn memory(&self) -> u64 {
        self.resources.memory.unwrap_or(0)
    }
}

/// Live jobs keyed by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<JobId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_all(&mut self, jobs: impl IntoIterator<Item = Job>) {
        for job in jobs {
            self.jobs.insert(job.id.clone(), job);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Job> {
        self.jobs.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Record a polled status. Returns false when the job is not tracked.
    pub fn set_status(&mut self, id: &str, status: JobStatus) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) => {
                job.status = status;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.keys().cloned().collect()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
