//! Domain types persisted by the registry store.

use std::fmt;

use gridjob_core::JobConfig;
use serde::{Deserialize, Serialize};

/// Cluster-side status of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterJobStatus {
    Registered,
    Deployed,
    Submitted,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl ClusterJobStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            ClusterJobStatus::Completed | ClusterJobStatus::Failed | ClusterJobStatus::Interrupted
        )
    }
}

impl fmt::Display for ClusterJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterJobStatus::Registered => "registered",
            ClusterJobStatus::Deployed => "deployed",
            ClusterJobStatus::Submitted => "submitted",
            ClusterJobStatus::Running => "running",
            ClusterJobStatus::Completed => "completed",
            ClusterJobStatus::Failed => "failed",
            ClusterJobStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// A job as the cluster registry knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub config: JobConfig,
    pub status: ClusterJobStatus,
    /// Set once `start_execution` has been accepted for the current graph.
    pub execution_started: bool,
    /// Failure reason when `status` is `Failed`.
    pub failure: Option<String>,
    /// Unix timestamp (seconds) when the job was registered.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: u64,
}

impl JobRecord {
    pub fn new(name: &str, config: JobConfig, now: u64) -> Self {
        Self {
            name: name.to_string(),
            config,
            status: ClusterJobStatus::Registered,
            execution_started: false,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, stamping `updated_at`.
    pub fn advance(&mut self, status: ClusterJobStatus, now: u64) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Build the composite key for the resources table.
pub fn resource_key(job: &str, resource: &str) -> String {
    format!("{job}:{resource}")
}

/// Job segment of a resources-table key.
///
/// Resource names never contain `:`, so the owner is everything before the
/// last one.
pub fn resource_owner(key: &str) -> Option<&str> {
    key.rsplit_once(':').map(|(job, _)| job)
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
