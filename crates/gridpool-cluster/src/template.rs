//! Resource-driven job template construction.

use gridpool_core::{ClusterConfig, ResourceRequirement};
use gridpool_drmaa::JobTemplate;

/// Share of the reserved memory a worker advertises to the task scheduler.
pub const ADVERTISED_MEMORY_FRACTION: f64 = 0.8;

const BYTES_PER_GB: u64 = 1_000_000_000;

/// Fill `template` for one bulk submission.
///
/// Returns the template and the requirement with cluster defaults
/// applied, which is what each job gets tagged with.
pub fn build_job_template(
    mut template: JobTemplate,
    config: &ClusterConfig,
    requested: &ResourceRequirement,
) -> (JobTemplate, ResourceRequirement) {
    let resolved = ResourceRequirement {
        memory: requested.memory.or(config.default_memory).filter(|m| *m > 0),
        cpus: requested.cpus,
        memory_fraction: Some(
            requested
                .memory_fraction
                .filter(|f| *f > 0.0)
                .unwrap_or(config.default_memory_fraction),
        ),
    };

    let mut args = base_args(config);
    let mut native = vec![config.native_specification.trim().to_string()];

    if let Some(memory) = resolved.memory {
        let fraction = resolved.memory_fraction.unwrap_or(config.default_memory_fraction);
        args.push("--memory-limit".to_string());
        args.push(scaled(memory, fraction).to_string());
        args.push("--resources".to_string());
        args.push(format!("memory={}", scaled(memory, ADVERTISED_MEMORY_FRACTION)));
        native.push(format!("-l h_vmem={}G", memory / BYTES_PER_GB));
    }
    if resolved.cpus > 0 {
        args.extend([
            "--nprocs".to_string(),
            "1".to_string(),
            "--nthreads".to_string(),
            resolved.cpus.to_string(),
        ]);
    }

    template.job_name = config.job_name.clone();
    template.remote_command = config.remote_command.clone();
    template.args = args;
    template.output_path = config.output_path.clone();
    template.error_path = config.error_path.clone();
    template.working_directory = config.working_directory.clone();
    template.native_specification = native
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (template, resolved)
}

/// Worker arguments shared by every submission.
fn base_args(config: &ClusterConfig) -> Vec<String> {
    config
        .scheduler_address
        .iter()
        .chain(config.args.iter())
        .cloned()
        .collect()
}

fn scaled(bytes: u64, fraction: f64) -> u64 {
    (bytes as f64 * fraction).round() as u64
}
