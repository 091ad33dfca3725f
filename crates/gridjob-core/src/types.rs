//! Shared types used across GridJob crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Longest accepted job name.
pub const MAX_JOB_NAME_LEN: usize = 128;

/// Control-plane operations, used to label failures and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Deploy,
    SubmitGraph,
    Execute,
    AwaitCompletion,
    Interrupt,
    Destroy,
    FetchAccumulators,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Init => "init",
            Operation::Deploy => "deploy",
            Operation::SubmitGraph => "submit-graph",
            Operation::Execute => "execute",
            Operation::AwaitCompletion => "await-completion",
            Operation::Interrupt => "interrupt",
            Operation::Destroy => "destroy",
            Operation::FetchAccumulators => "fetch-accumulators",
        };
        f.write_str(name)
    }
}

/// How a cluster-side execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    Failed { reason: String },
    Interrupted,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }
}

/// Check that `name` is usable as a cluster-unique job name.
///
/// Names double as registry keys and URL path segments.
pub fn validate_job_name(name: &str) -> JobResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_JOB_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidJobName(name.to_string()))
    }
}
