//! gridjob-core — shared domain types for GridJob.
//!
//! Holds everything both sides of the control plane agree on: the job
//! state machine, deployment resources, the opaque computation graph,
//! accumulators, configuration and the job error taxonomy.

pub mod accumulator;
pub mod config;
pub mod dag;
pub mod error;
pub mod resource;
pub mod state;
pub mod types;

pub use accumulator::{Accumulator, Accumulators};
pub use config::{ClientConfig, ClusterMode, JobConfig, PoolConfig};
pub use dag::Dag;
pub use error::{BoxError, JobError, JobResult, ResourceError};
pub use resource::{CodeLoader, DeploymentResource, FsCodeLoader, Locator, Payload, ResourceType};
pub use state::{JobEvent, JobState, JobStateMachine};
pub use types::*;
