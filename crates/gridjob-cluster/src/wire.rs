//! JSON shapes shared by the HTTP API and [`RemoteCluster`](crate::RemoteCluster).

use serde::{Deserialize, Serialize};

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Base path of the job routes.
pub const JOBS_PATH: &str = "/api/v1/jobs";

pub fn job_path(job: &str) -> String {
    format!("{JOBS_PATH}/{job}")
}

pub fn job_subpath(job: &str, leaf: &str) -> String {
    format!("{JOBS_PATH}/{job}/{leaf}")
}
