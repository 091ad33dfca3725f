//! gridjob-state — cluster-side job registry for GridJob.
//!
//! Backed by [redb](https://docs.rs/redb), persists job records, deployed
//! resources, submitted graphs and final accumulator snapshots.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Per-job child keys are `{job}:{resource}`; scans match the job segment
//! exactly, and
//! `purge_job` removes a job and all of its children in one transaction.
//!
//! The `RegistryStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{Stage, StateError, StateResult};
pub use store::RegistryStore;
pub use types::*;
