//! SGE session driven through the `qsub`, `qdel` and `qstat` commands.
//!
//! Bulk submissions become array jobs (`qsub -t start-end:step`), so a
//! job id is `"<array>.<task>"`. States are read from the `qstat` table;
//! SGE drops finished jobs from it, so a job missing from the table is
//! reported as invalid, the same way a DRMAA library does once a job has
//! been reaped.

use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use gridpool_core::JobId;

use crate::error::{SessionError, SessionResult};
use crate::session::{state, BatchSession, JobControlAction, JobTemplate, NativeJobState};

pub struct QsubSession {
    active: AtomicBool,
    /// Delay between `qstat` polls while synchronizing.
    poll_interval: Duration,
}

impl QsubSession {
    pub fn new() -> Self {
        info!("opening SGE command-line session");
        Self {
            active: AtomicBool::new(true),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn ensure_active(&self) -> SessionResult<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::NoActiveSession)
        }
    }

    async fn qstat(&self) -> SessionResult<String> {
        let output = run("qstat", &["-u".to_string(), "*".to_string()]).await?;
        if !output.status.success() {
            return Err(SessionError::Command(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for QsubSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchSession for QsubSession {
    async fn run_bulk_jobs(
        &self,
        template: &JobTemplate,
        start: u32,
        end: u32,
        step: u32,
    ) -> SessionResult<Vec<JobId>> {
        self.ensure_active()?;
        if step == 0 || start == 0 || end < start {
            return Err(SessionError::Rejected(format!(
                "invalid task range {start}-{end}:{step}"
            )));
        }

        let args = qsub_args(template, start, end, step);
        debug!(?args, "qsub");
        let output = run("qsub", &args).await?;
        if !output.status.success() {
            return Err(SessionError::Rejected(stderr_of(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let array = parse_terse_array(&stdout)?;
        Ok((start..=end)
            .step_by(step as usize)
            .map(|task| format!("{array}.{task}"))
            .collect())
    }

    async fn control(&self, id: &str, action: JobControlAction) -> SessionResult<()> {
        self.ensure_active()?;
        let JobControlAction::Terminate = action;

        let (job, task) = split_job_id(id);
        let mut args = vec![job.to_string()];
        if let Some(task) = task {
            args.push("-t".to_string());
            args.push(task.to_string());
        }

        let output = run("qdel", &args).await?;
        let message = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if message.contains("does not exist") {
            return Err(SessionError::InvalidJob(id.to_string()));
        }
        if !output.status.success() {
            return Err(SessionError::Command(message.trim().to_string()));
        }
        Ok(())
    }

    async fn job_status(&self, id: &str) -> SessionResult<NativeJobState> {
        self.ensure_active()?;
        let table = self.qstat().await?;
        parse_qstat_state(&table, id).ok_or_else(|| SessionError::InvalidJob(id.to_string()))
    }

    async fn synchronize(&self, ids: &[JobId], _dispose: bool) -> SessionResult<()> {
        self.ensure_active()?;
        let mut pending: Vec<&JobId> = ids.iter().collect();

        while !pending.is_empty() {
            let table = self.qstat().await?;
            pending.retain(|id| match parse_qstat_state(&table, id) {
                Some(code) => code != state::DONE && code != state::FAILED,
                None => false,
            });
            if pending.is_empty() {
                break;
            }
            debug!(remaining = pending.len(), "waiting for jobs to leave the queue");
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    async fn exit(&self) -> SessionResult<()> {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("SGE command-line session closed");
            Ok(())
        } else {
            Err(SessionError::NoActiveSession)
        }
    }
}

async fn run(program: &str, args: &[String]) -> SessionResult<Output> {
    Command::new(program).args(args).output().await.map_err(|e| {
        warn!(program, error = %e, "failed to launch scheduler command");
        SessionError::Command(format!("{program}: {e}"))
    })
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// DRMAA paths may carry a `host:` prefix; qsub wants the bare path.
fn strip_host(path: &str) -> &str {
    match path.split_once(':') {
        Some((_, p)) => p,
        None => path,
    }
}

fn qsub_args(template: &JobTemplate, start: u32, end: u32, step: u32) -> Vec<String> {
    let mut args = vec![
        "-terse".to_string(),
        "-b".to_string(),
        "y".to_string(),
        "-t".to_string(),
        format!("{start}-{end}:{step}"),
    ];
    if !template.job_name.is_empty() {
        args.extend(["-N".to_string(), template.job_name.clone()]);
    }
    if !template.output_path.is_empty() {
        args.extend(["-o".to_string(), strip_host(&template.output_path).to_string()]);
    }
    if !template.error_path.is_empty() {
        args.extend(["-e".to_string(), strip_host(&template.error_path).to_string()]);
    }
    if !template.working_directory.is_empty() {
        args.extend(["-wd".to_string(), template.working_directory.clone()]);
    }
    args.extend(template.native_specification.split_whitespace().map(str::to_string));
    args.push(template.remote_command.clone());
    args.extend(template.args.iter().cloned());
    args
}

/// `qsub -terse` prints `"<array>.<start>-<end>:<step>"` for array jobs.
fn parse_terse_array(stdout: &str) -> SessionResult<String> {
    let line = stdout.trim();
    let array = line.split('.').next().unwrap_or_default();
    if array.is_empty() || !array.chars().all(|c| c.is_ascii_digit()) {
        return Err(SessionError::Parse(format!("qsub returned {line:?}")));
    }
    Ok(array.to_string())
}

fn split_job_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once('.') {
        Some((job, task)) => (job, Some(task)),
        None => (id, None),
    }
}

/// Find `id` in a `qstat` table and return its native state.
fn parse_qstat_state(table: &str, id: &str) -> Option<NativeJobState> {
    let (job, task) = split_job_id(id);
    let task: Option<u32> = task.and_then(|t| t.parse().ok());

    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || fields[0] != job {
            continue;
        }
        let matches = match task {
            None => true,
            Some(t) => fields.last().is_some_and(|spec| task_spec_contains(spec, t)),
        };
        if matches {
            return Some(state_from_letters(fields[4]));
        }
    }
    None
}

/// Does an SGE task spec (`"3"`, `"2-5:1"`, `"1,4,6"`) cover `task`?
fn task_spec_contains(spec: &str, task: u32) -> bool {
    spec.split(',').any(|part| {
        let (range, step) = match part.split_once(':') {
            Some((r, s)) => (r, s.parse::<u32>().unwrap_or(1).max(1)),
            None => (part, 1),
        };
        match range.split_once('-') {
            Some((lo, hi)) => match (lo.parse::<u32>(), hi.parse::<u32>()) {
                (Ok(lo), Ok(hi)) => task >= lo && task <= hi && (task - lo) % step == 0,
                _ => false,
            },
            None => range.parse::<u32>() == Ok(task),
        }
    })
}

fn state_from_letters(letters: &str) -> NativeJobState {
    if letters.contains('E') {
        state::FAILED
    } else if letters.starts_with('d') {
        state::DONE
    } else if letters.contains('h') {
        state::USER_ON_HOLD
    } else if letters.contains('S') || letters.contains('T') {
        state::SYSTEM_SUSPENDED
    } else if letters.contains('s') {
        state::USER_SUSPENDED
    } else if letters.contains('r') || letters.contains('t') || letters.contains('R') {
        state::RUNNING
    } else if letters.contains('q') {
        state::QUEUED_ACTIVE
    } else {
        state::UNDETERMINED
    }
}
