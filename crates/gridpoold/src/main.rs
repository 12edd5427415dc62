//! gridpoold — runs a pool of workers on an SGE grid.
//!
//! # Usage
//!
//! ```text
//! gridpoold run --config gridpool.toml --workers 4 --memory 8000000000
//! gridpoold status --config gridpool.toml 4711.1 4711.2
//! ```
//!
//! `run` keeps a fixed number of workers until Ctrl-C, then terminates
//! them and waits for the grid to dispose of them. It polls their status
//! on the adaptive interval but does not adapt the pool: that needs a
//! task scheduler, which embedders plug into
//! `gridpool_adaptive::AdaptiveController`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use gridpool_cluster::ClusterJobManager;
use gridpool_core::{GridpoolConfig, ResourceRequirement};
use gridpool_drmaa::{BatchSession, MemorySession, QsubSession};

const DEFAULT_LOG_FILTER: &str = "info,gridpoold=debug,gridpool=debug";

#[derive(Parser)]
#[command(name = "gridpoold", about = "gridpool worker pool daemon", version)]
struct Cli {
    /// Path to gridpool.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start workers and keep them until interrupted.
    Run {
        /// Number of workers to submit.
        #[arg(long, default_value = "1")]
        workers: u32,

        /// Memory per worker in bytes (overrides cluster.default_memory).
        #[arg(long)]
        memory: Option<u64>,

        /// Threads per worker.
        #[arg(long, default_value = "1")]
        cpus: u32,

        /// Keep jobs in memory instead of submitting to the grid.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the state of jobs.
    Status {
        /// Job ids, e.g. 4711.1
        #[arg(required = true)]
        job_ids: Vec<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
                }),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            workers,
            memory,
            cpus,
            dry_run,
        } => {
            let resources = ResourceRequirement {
                memory,
                cpus,
                memory_fraction: None,
            };
            run(config, workers, resources, dry_run).await
        }
        Command::Status { job_ids, format } => status(config, &job_ids, &format).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GridpoolConfig> {
    match path {
        Some(path) => {
            let config = GridpoolConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => Ok(GridpoolConfig::default()),
    }
}

fn open_session(dry_run: bool) -> Arc<dyn BatchSession> {
    if dry_run {
        info!("dry run: jobs stay in memory");
        Arc::new(MemorySession::new())
    } else {
        Arc::new(QsubSession::new())
    }
}

async fn run(
    config: GridpoolConfig,
    workers: u32,
    resources: ResourceRequirement,
    dry_run: bool,
) -> anyhow::Result<()> {
    let period = config.adaptive.interval();
    let manager = ClusterJobManager::new(config.cluster, open_session(dry_run));

    if let Err(e) = manager.start_workers(workers, &resources).await {
        manager.close().await;
        return Err(e.into());
    }

    let mut ticker = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (job_id, status) in manager.refresh_statuses().await {
                    tracing::debug!(%job_id, %status, "worker status");
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!(%manager, "stopping workers");
    manager.close().await;
    info!("gridpoold stopped");
    Ok(())
}

async fn status(config: GridpoolConfig, job_ids: &[String], format: &str) -> anyhow::Result<()> {
    let manager = ClusterJobManager::new(config.cluster, open_session(false));

    let mut rows = Vec::with_capacity(job_ids.len());
    for id in job_ids {
        rows.push((id.clone(), manager.status(id).await));
    }

    match format {
        "json" => {
            let out: Vec<_> = rows
                .iter()
                .map(|(id, status)| serde_json::json!({ "job_id": id, "status": status }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            for (id, status) in &rows {
                println!("{id}\t{status}");
            }
        }
    }

    manager.close().await;
    Ok(())
}
