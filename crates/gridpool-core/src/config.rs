//! gridpool.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridpoolConfig {
    pub cluster: ClusterConfig,
    pub adaptive: AdaptiveConfig,
}

/// Job template settings passed through to every submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub job_name: String,
    /// Worker executable on the compute nodes.
    pub remote_command: String,
    /// Base worker arguments, before any resource flags.
    pub args: Vec<String>,
    /// DRMAA-style path template, e.g. `":/home/me/out"`.
    pub output_path: String,
    pub error_path: String,
    pub working_directory: String,
    /// Extra native scheduler flags, e.g. `"-q long.q"`.
    pub native_specification: String,
    /// Task scheduler address handed to workers as their first argument.
    pub scheduler_address: Option<String>,
    /// Memory per worker in bytes when a submission does not name one.
    pub default_memory: Option<u64>,
    pub default_memory_fraction: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            job_name: "grid-worker".to_string(),
            remote_command: "grid-worker".to_string(),
            args: Vec::new(),
            output_path: format!(":{}", cwd.join("out").display()),
            error_path: format!(":{}", cwd.join("err").display()),
            working_directory: cwd.display().to_string(),
            native_specification: String::new(),
            scheduler_address: None,
            default_memory: None,
            default_memory_fraction: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Time between adaptation passes in milliseconds.
    pub interval_ms: u64,
}

impl AdaptiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl GridpoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GridpoolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
