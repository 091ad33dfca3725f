//! redb table definitions for the GridJob registry store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Per-job child records use the composite key `{job}:{child}`.

use redb::TableDefinition;

/// Job records keyed by `{job}`.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Deployed resources keyed by `{job}:{resource_name}`.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Submitted computation graphs keyed by `{job}`.
pub const GRAPHS: TableDefinition<&str, &[u8]> = TableDefinition::new("graphs");

/// Final accumulator snapshots keyed by `{job}`.
pub const ACCUMULATORS: TableDefinition<&str, &[u8]> = TableDefinition::new("accumulators");
