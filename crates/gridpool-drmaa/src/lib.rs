//! gridpool-drmaa — the batch scheduler session seam.
//!
//! A [`BatchSession`] is one open connection to a DRMAA-style grid
//! scheduler. It creates job templates, bulk-submits numbered job
//! arrays, terminates jobs, polls their state and waits for them to
//! finish. Native states use DRMAA numbering and are folded into
//! [`JobStatus`](gridpool_core::JobStatus) by [`map_job_state`].
//!
//! # Implementations
//!
//! ```text
//! BatchSession
//!   ├── MemorySession  in-process bookkeeping (tests, dry runs)
//!   └── QsubSession    SGE command line: qsub / qdel / qstat
//! ```

pub mod error;
pub mod memory;
pub mod qsub;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use memory::MemorySession;
pub use qsub::QsubSession;
pub use session::{map_job_state, state, BatchSession, JobControlAction, JobTemplate, NativeJobState};
