//! gridpool-cluster — worker pool bookkeeping on top of a batch session.
//!
//! The [`ClusterJobManager`] owns one [`BatchSession`](gridpool_drmaa::BatchSession)
//! and the pool of jobs it submitted:
//!
//! - Starts workers as one bulk job array per request
//! - Stops workers and forgets them, even when termination fails
//! - Polls job state, folding unknown jobs into `InvalidJob`
//! - Terminates whatever is left and releases the session on close
//!
//! # Sizing
//!
//! ```text
//! memory M, fraction f (default 0.6)
//!   worker --memory-limit      M * f     self-imposed limit
//!   worker --resources memory= M * 0.8   advertised to the task scheduler
//!   grid   -l h_vmem=           floor(M / 1e9) G   reserved on the node
//! ```

pub mod error;
pub mod manager;
pub mod registry;
pub mod template;

pub use error::{ClusterError, ClusterResult};
pub use manager::ClusterJobManager;
pub use registry::{Job, JobRegistry};
