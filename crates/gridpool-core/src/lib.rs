//! gridpool-core — shared types and configuration.
//!
//! Everything here is plain data: the identifiers and job states shared
//! by the session, cluster and adaptive crates, plus the `gridpool.toml`
//! parser.

pub mod config;
pub mod types;

pub use config::{AdaptiveConfig, ClusterConfig, GridpoolConfig};
pub use types::*;
