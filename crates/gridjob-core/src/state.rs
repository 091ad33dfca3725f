//! Job state machine — the single source of truth for a job's phase.
//!
//! The machine owns the current [`JobState`] and validates every
//! [`JobEvent`] against a fixed transition table. State lives in an
//! atomic so readers never block and concurrent transitions resolve
//! through compare-and-swap: at most one caller applies a given change,
//! the rest observe the new state and get the validation error.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{JobError, JobResult};

/// Lifecycle phase of a job as seen by its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobState {
    /// Handle created, nothing sent to the cluster yet.
    Unstarted = 0,
    /// Configuration bound and job registered with the cluster.
    Initialized = 1,
    /// Resource bundle shipped to the cluster.
    Deployed = 2,
    /// Computation graph accepted by the cluster.
    Submitted = 3,
    /// Execution started cluster-side.
    Running = 4,
    /// Execution finished successfully.
    Completed = 5,
    /// Execution finished with an error.
    Failed = 6,
    /// Execution stopped on request.
    Interrupted = 7,
    /// All cluster-side and local state released.
    Destroyed = 8,
}

impl JobState {
    pub const ALL: [JobState; 9] = [
        JobState::Unstarted,
        JobState::Initialized,
        JobState::Deployed,
        JobState::Submitted,
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Interrupted,
        JobState::Destroyed,
    ];

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Unstarted,
            1 => JobState::Initialized,
            2 => JobState::Deployed,
            3 => JobState::Submitted,
            4 => JobState::Running,
            5 => JobState::Completed,
            6 => JobState::Failed,
            7 => JobState::Interrupted,
            _ => JobState::Destroyed,
        }
    }

    /// Whether execution has begun (running or any of its outcomes).
    pub fn has_started(self) -> bool {
        matches!(
            self,
            JobState::Running | JobState::Completed | JobState::Failed | JobState::Interrupted
        )
    }

    /// Whether execution has reached an outcome.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Interrupted
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            JobState::Unstarted => "UNSTARTED",
            JobState::Initialized => "INITIALIZED",
            JobState::Deployed => "DEPLOYED",
            JobState::Submitted => "SUBMITTED",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Interrupted => "INTERRUPTED",
            JobState::Destroyed => "DESTROYED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle events that move a job between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    Init,
    Deploy,
    Submit,
    Execute,
    Complete,
    Fail,
    Interrupt,
    Destroy,
}

impl JobEvent {
    pub const ALL: [JobEvent; 8] = [
        JobEvent::Init,
        JobEvent::Deploy,
        JobEvent::Submit,
        JobEvent::Execute,
        JobEvent::Complete,
        JobEvent::Fail,
        JobEvent::Interrupt,
        JobEvent::Destroy,
    ];
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobEvent::Init => "init",
            JobEvent::Deploy => "deploy",
            JobEvent::Submit => "submit",
            JobEvent::Execute => "execute",
            JobEvent::Complete => "complete",
            JobEvent::Fail => "fail",
            JobEvent::Interrupt => "interrupt",
            JobEvent::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Authoritative record of one job's phase.
#[derive(Debug)]
pub struct JobStateMachine {
    job: String,
    state: AtomicU8,
}

impl JobStateMachine {
    /// Create a machine in `Unstarted`.
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            state: AtomicU8::new(JobState::Unstarted as u8),
        }
    }

    /// Name of the job this machine tracks.
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Latest known state. Never blocks.
    pub fn current_state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The transition table: where `event` leads from `from`, if anywhere.
    pub fn next_state(from: JobState, event: JobEvent) -> Option<JobState> {
        use JobEvent as E;
        use JobState as S;

        match (from, event) {
            (S::Destroyed, _) => None,
            (_, E::Destroy) => Some(S::Destroyed),
            (S::Unstarted, E::Init) => Some(S::Initialized),
            (S::Initialized, E::Deploy) => Some(S::Deployed),
            (S::Deployed, E::Submit) => Some(S::Submitted),
            (S::Submitted, E::Execute) => Some(S::Running),
            (S::Running, E::Complete) => Some(S::Completed),
            (S::Running, E::Fail) => Some(S::Failed),
            (S::Running, E::Interrupt) => Some(S::Interrupted),
            _ => None,
        }
    }

    /// Check that `event` is legal right now without applying it.
    pub fn ensure(&self, event: JobEvent) -> JobResult<JobState> {
        let current = self.current_state();
        Self::next_state(current, event).ok_or_else(|| self.illegal(current, event))
    }

    /// Apply `event`, returning the new state.
    ///
    /// Fails with [`JobError::IllegalStateTransition`] and leaves the state
    /// untouched when the table has no entry for the current state.
    pub fn transition(&self, event: JobEvent) -> JobResult<JobState> {
        let mut current = self.current_state();
        loop {
            let next = Self::next_state(current, event).ok_or_else(|| self.illegal(current, event))?;

            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if next == JobState::Destroyed || next.is_finished() {
                        info!(job = %self.job, from = %current, to = %next, %event, "job state changed");
                    } else {
                        debug!(job = %self.job, from = %current, to = %next, %event, "job state changed");
                    }
                    return Ok(next);
                }
                // Lost the race; re-validate against what the winner wrote.
                Err(observed) => current = JobState::from_u8(observed),
            }
        }
    }

    fn illegal(&self, state: JobState, event: JobEvent) -> JobError {
        JobError::IllegalStateTransition {
            job: self.job.clone(),
            state,
            event,
        }
    }
}
