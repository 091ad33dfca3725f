//! The contract every cluster transport implements.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use gridjob_core::{Accumulators, Dag, DeploymentResource, ExecutionOutcome, JobConfig};
use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// Boxed future returned by [`ClusterRegistry`] methods.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = ClusterResult<T>> + Send + 'a>>;

/// How a registry reaches the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Same process.
    Local,
    /// HTTP to a gridjobd instance.
    Remote,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => f.write_str("local"),
            Transport::Remote => f.write_str("remote"),
        }
    }
}

/// Cluster-side authority over job lifecycle.
///
/// Every method resolves once the cluster has acknowledged the request.
/// Implementations must make `destroy_job` idempotent and accept
/// `start_execution` at most once per submitted graph.
pub trait ClusterRegistry: Send + Sync {
    fn register_job<'a>(&'a self, job: &'a str, config: &'a JobConfig) -> ClusterFuture<'a, ()>;

    fn deploy_resources<'a>(
        &'a self,
        job: &'a str,
        resources: &'a [DeploymentResource],
    ) -> ClusterFuture<'a, ()>;

    fn submit_graph<'a>(&'a self, job: &'a str, graph: &'a Dag) -> ClusterFuture<'a, ()>;

    fn start_execution<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()>;

    /// Wait for a started execution to reach its outcome.
    fn await_completion<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ExecutionOutcome>;

    fn request_interrupt<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()>;

    fn destroy_job<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()>;

    fn fetch_accumulators<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, Accumulators>;

    fn transport(&self) -> Transport;
}
