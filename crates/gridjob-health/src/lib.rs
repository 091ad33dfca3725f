//! gridjob-health — health monitor for GridJob cluster nodes.
//!
//! Periodically samples memory, CPU load, thread count and the number of
//! active jobs, and logs the sample depending on the configured level.
//! The monitor is an observer only; it never influences job execution.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── Background task (stopped via watch channel)
//!   │   ├── HealthMetrics::sample(MetricSource, active jobs)
//!   │   └── Noisy: log every sample / Silent: log above threshold
//!   └── MetricSource (ProcMetricSource on Linux, -1 fallbacks elsewhere)
//! ```

pub mod metrics;
pub mod monitor;

pub use metrics::{
    HealthMetrics, MemoryInfo, MetricSource, ProcMetricSource, bytes_to_string, percentage_string,
    probe,
};
pub use monitor::{HealthLevel, HealthMonitor, MonitorHandle, ParseLevelError};
