use gridjob_state::{ClusterJobStatus, StateError};
use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("invalid job name '{0}': expected 1-128 characters from [A-Za-z0-9._-]")]
    InvalidJobName(String),

    #[error("job '{0}' already exists")]
    JobAlreadyExists(String),

    #[error("job '{job}' is {status}, {operation} requires {expected}")]
    InvalidStatus {
        job: String,
        status: ClusterJobStatus,
        operation: &'static str,
        expected: &'static str,
    },

    #[error("job '{job}': resource '{name}' already deployed with different content")]
    ResourceConflict { job: String, name: String },

    #[error("job '{job}': graph references undeployed resources: {}", missing.join(", "))]
    GraphRejected { job: String, missing: Vec<String> },

    #[error("job '{0}': execution already started")]
    ExecutionAlreadyStarted(String),

    #[error("job '{0}' is not running")]
    NotRunning(String),

    #[error("registry store error: {0}")]
    State(#[from] StateError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cluster returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("no tokio runtime to run executions on: {0}")]
    Runtime(String),
}
