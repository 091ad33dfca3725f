//! Health monitor — background task that samples node health.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics::{HealthMetrics, MetricSource, ProcMetricSource};

/// Percentage above which `Silent` starts logging.
pub const DEFAULT_THRESHOLD: f64 = 70.0;

/// How much the monitor logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    /// Never started.
    Off,
    /// Logs only samples above the threshold.
    #[default]
    Silent,
    /// Logs every sample.
    Noisy,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthLevel::Off => f.write_str("off"),
            HealthLevel::Silent => f.write_str("silent"),
            HealthLevel::Noisy => f.write_str("noisy"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown health level '{0}' (expected off, silent or noisy)")]
pub struct ParseLevelError(String);

impl FromStr for HealthLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(HealthLevel::Off),
            "silent" => Ok(HealthLevel::Silent),
            "noisy" => Ok(HealthLevel::Noisy),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Reports how many jobs are currently executing.
pub type ActiveJobs = Arc<dyn Fn() -> usize + Send + Sync>;

pub struct HealthMonitor {
    level: HealthLevel,
    interval: Duration,
    threshold: f64,
    source: Arc<dyn MetricSource>,
    active_jobs: ActiveJobs,
}

impl HealthMonitor {
    pub fn new(level: HealthLevel, interval: Duration) -> Self {
        Self {
            level,
            interval,
            threshold: DEFAULT_THRESHOLD,
            source: Arc::new(ProcMetricSource::new()),
            active_jobs: Arc::new(|| 0),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_active_jobs(mut self, active_jobs: ActiveJobs) -> Self {
        self.active_jobs = active_jobs;
        self
    }

    pub fn level(&self) -> HealthLevel {
        self.level
    }

    /// Take one sample now.
    pub fn sample(&self) -> HealthMetrics {
        HealthMetrics::sample(self.source.as_ref(), (self.active_jobs)(), self.threshold)
    }

    /// Spawn the sampling loop. Returns `None` when the level is `Off`.
    pub fn start(self) -> Option<MonitorHandle> {
        if self.level == HealthLevel::Off {
            debug!("health monitor disabled");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(level = %self.level, interval_secs = self.interval.as_secs(), threshold = self.threshold, "health monitor started");
        let handle = tokio::spawn(run_monitor_loop(self, shutdown_rx));
        Some(MonitorHandle {
            handle,
            shutdown_tx,
        })
    }
}

/// Running monitor task.
pub struct MonitorHandle {
    handle: JoinHandle<u64>,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorHandle {
    /// Stop the loop and wait for it to exit. Returns how many samples were logged.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        self.handle.await.unwrap_or_default()
    }
}

async fn run_monitor_loop(monitor: HealthMonitor, mut shutdown: watch::Receiver<bool>) -> u64 {
    let mut logged = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(monitor.interval) => {
                let metrics = monitor.sample();
                let log = match monitor.level {
                    HealthLevel::Noisy => true,
                    HealthLevel::Silent => metrics.exceeds_threshold(),
                    HealthLevel::Off => false,
                };
                if log {
                    info!(target: "gridjob::health", "{metrics}");
                    logged += 1;
                }
            }
            _ = shutdown.changed() => {
                debug!("health monitor shutting down");
                break;
            }
        }
    }
    logged
}
