//! gridjob-cluster — the cluster side of the GridJob control plane.
//!
//! [`ClusterRegistry`] is the contract a job handle drives. Two
//! implementations ship here:
//!
//! - [`LocalCluster`]: in-process, backed by a redb [`RegistryStore`]
//!   and a pluggable [`GraphExecutor`].
//! - [`RemoteCluster`]: HTTP/1 JSON client against a gridjobd instance.
//!
//! [`RegistryStore`]: gridjob_state::RegistryStore

pub mod error;
pub mod executor;
pub mod local;
pub mod registry;
pub mod remote;
pub mod wire;

pub use error::{ClusterError, ClusterResult};
pub use executor::{AccumulatorSink, ExecutionContext, ExecutionFuture, GraphExecutor, NoopExecutor};
pub use local::LocalCluster;
pub use registry::{ClusterFuture, ClusterRegistry, Transport};
pub use remote::RemoteCluster;
