//! Error types shared by every GridJob crate that drives a job.

use std::path::Path;

use thiserror::Error;

use crate::state::{JobEvent, JobState};
use crate::types::Operation;

/// Result type alias for job lifecycle operations.
pub type JobResult<T> = Result<T, JobError>;

/// Boxed cause carried by wrapped control-plane failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building or driving a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job '{job}': event {event} is not valid from state {state}")]
    IllegalStateTransition {
        job: String,
        state: JobState,
        event: JobEvent,
    },

    #[error("job '{job}': {operation} is not permitted in state {state}")]
    OperationNotPermitted {
        job: String,
        state: JobState,
        operation: Operation,
    },

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("job '{job}': resource bundle is frozen once deployment has started")]
    BundleFrozen { job: String },

    #[error("job '{job}': {operation} failed: {source}")]
    ControlOperation {
        job: String,
        operation: Operation,
        #[source]
        source: BoxError,
    },

    #[error("job '{job}': cluster-side destroy failed: {source}")]
    Destroy {
        job: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid job name '{0}': expected 1-128 characters from [A-Za-z0-9._-]")]
    InvalidJobName(String),

    #[error("job '{job}': worker pool unavailable: {source}")]
    WorkerPool {
        job: String,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Wrap a transport, codec or cluster failure raised by `operation`.
    pub fn control<E>(job: &str, operation: Operation, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        JobError::ControlOperation {
            job: job.to_string(),
            operation,
            source: source.into(),
        }
    }

    /// True for both flavours of "not valid in the current state".
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            JobError::IllegalStateTransition { .. } | JobError::OperationNotPermitted { .. }
        )
    }
}

/// Failures locating or reading a deployment resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("cannot read '{locator}': {source}")]
    Unreadable {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported resource locator: {0}")]
    UnsupportedLocator(String),

    #[error("invalid resource name '{0}'")]
    InvalidName(String),

    #[error("resource '{name}' is already registered with different content")]
    Conflict { name: String },
}

impl ResourceError {
    pub(crate) fn unreadable(path: &Path, source: std::io::Error) -> Self {
        ResourceError::Unreadable {
            locator: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_error_keeps_cause_and_context() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = JobError::control("wordcount", Operation::Deploy, io);

        let msg = err.to_string();
        assert!(msg.contains("wordcount"));
        assert!(msg.contains("deploy"));
        assert!(msg.contains("reset by peer"));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn illegal_state_classification() {
        let err = JobError::OperationNotPermitted {
            job: "j".to_string(),
            state: JobState::Submitted,
            operation: Operation::FetchAccumulators,
        };
        assert!(err.is_illegal_state());
        assert!(!JobError::BundleFrozen { job: "j".to_string() }.is_illegal_state());
    }
}
