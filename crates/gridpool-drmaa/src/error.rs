//! Session error types.

use gridpool_core::JobId;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by a batch scheduler session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The scheduler does not know this job id.
    #[error("invalid job: {0}")]
    InvalidJob(JobId),

    #[error("no active session")]
    NoActiveSession,

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("scheduler command failed: {0}")]
    Command(String),

    #[error("unexpected scheduler output: {0}")]
    Parse(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Command(e.to_string())
    }
}
