//! Health metric sampling.
//!
//! Platform metrics are capability-probed: every getter on [`MetricSource`]
//! is fallible, and [`probe`] turns a missing value into `-1`.

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// Sentinel reported for metrics the platform does not expose.
pub const UNAVAILABLE: f64 = -1.0;

/// Linux reports per-process CPU time in USER_HZ ticks.
const USER_HZ: f64 = 100.0;

const UNITS: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];

/// Memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub used: u64,
    pub free: u64,
    pub total: u64,
    /// Upper bound the process may grow to.
    pub max: u64,
}

/// Where platform metrics come from.
pub trait MetricSource: Send + Sync {
    fn memory(&self) -> Option<MemoryInfo>;

    /// Process CPU usage since the previous call, in percent of one core
    /// times the number of cores.
    fn process_cpu_load(&self) -> Option<f64>;

    /// One-minute load average as a percentage of available cores.
    fn system_load_average(&self) -> Option<f64>;

    fn thread_count(&self) -> Option<u64>;
}

/// `value`, or [`UNAVAILABLE`] when the platform cannot provide it.
pub fn probe(value: Option<f64>) -> f64 {
    value.unwrap_or(UNAVAILABLE)
}

/// Reads metrics from `/proc`. On other platforms every getter yields `None`.
#[derive(Debug, Default)]
pub struct ProcMetricSource {
    last_cpu: Mutex<Option<(Instant, u64)>>,
}

impl ProcMetricSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricSource for ProcMetricSource {
    fn memory(&self) -> Option<MemoryInfo> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let (total, free) = parse_meminfo(&meminfo)?;
        let max = std::fs::read_to_string("/sys/fs/cgroup/memory.max")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map_or(total, |limit| limit.min(total));
        Some(MemoryInfo {
            used: total.saturating_sub(free),
            free,
            total,
            max,
        })
    }

    fn process_cpu_load(&self) -> Option<f64> {
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        let ticks = parse_stat_cpu_ticks(&stat)?;
        let now = Instant::now();

        let mut last = self.last_cpu.lock().unwrap_or_else(|p| p.into_inner());
        let previous = last.replace((now, ticks));
        let (then, then_ticks) = previous?;
        let elapsed = now.duration_since(then).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let cpu_secs = ticks.saturating_sub(then_ticks) as f64 / USER_HZ;
        Some(100.0 * cpu_secs / elapsed / cores())
    }

    fn system_load_average(&self) -> Option<f64> {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        let one_minute = parse_loadavg(&loadavg)?;
        Some(100.0 * one_minute / cores())
    }

    fn thread_count(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_status_threads(&status)
    }
}

fn cores() -> f64 {
    std::thread::available_parallelism().map_or(1.0, |n| n.get() as f64)
}

/// `(MemTotal, MemAvailable)` in bytes.
fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let field = |name: &str| {
        content
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };
    Some((field("MemTotal:")?, field("MemAvailable:")?))
}

fn parse_loadavg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

fn parse_status_threads(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|v| v.trim().parse().ok())
}

/// utime + stime from `/proc/self/stat`.
fn parse_stat_cpu_ticks(content: &str) -> Option<u64> {
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After the name: state is field 3, utime field 14, stime field 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// One health sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetrics {
    pub memory: Option<MemoryInfo>,
    pub process_cpu_load: f64,
    pub system_load_average: f64,
    pub thread_count: Option<u64>,
    pub active_jobs: usize,
    pub threshold: f64,
}

impl HealthMetrics {
    pub fn sample(source: &dyn MetricSource, active_jobs: usize, threshold: f64) -> Self {
        Self {
            memory: source.memory(),
            process_cpu_load: probe(source.process_cpu_load()),
            system_load_average: probe(source.system_load_average()),
            thread_count: source.thread_count(),
            active_jobs,
            threshold,
        }
    }

    pub fn memory_used_of_total(&self) -> f64 {
        self.memory
            .map_or(UNAVAILABLE, |m| ratio(m.used, m.total))
    }

    pub fn memory_used_of_max(&self) -> f64 {
        self.memory.map_or(UNAVAILABLE, |m| ratio(m.used, m.max))
    }

    /// True when memory or CPU usage is above the threshold percentage.
    pub fn exceeds_threshold(&self) -> bool {
        self.memory_used_of_max() > self.threshold
            || self.process_cpu_load > self.threshold
            || self.system_load_average > self.threshold
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return UNAVAILABLE;
    }
    100.0 * part as f64 / whole as f64
}

impl fmt::Display for HealthMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.memory {
            Some(m) => write!(
                f,
                "memory.used={}, memory.free={}, memory.total={}, memory.max={}, ",
                bytes_to_string(m.used),
                bytes_to_string(m.free),
                bytes_to_string(m.total),
                bytes_to_string(m.max),
            )?,
            None => f.write_str("memory=unavailable, ")?,
        }
        write!(
            f,
            "memory.used/total={} memory.used/max={} ",
            percentage_string(self.memory_used_of_total()),
            percentage_string(self.memory_used_of_max()),
        )?;
        write!(
            f,
            "load.process={:.2}%, load.systemAverage={:.2}% ",
            self.process_cpu_load, self.system_load_average
        )?;
        match self.thread_count {
            Some(n) => write!(f, "thread.count={n}, ")?,
            None => write!(f, "thread.count={UNAVAILABLE}, ")?,
        }
        write!(f, "jobs.active={}", self.active_jobs)
    }
}

/// Two-decimal percentage, e.g. `12.50%`.
pub fn percentage_string(p: f64) -> String {
    format!("{p:.2}%")
}

/// Human-readable byte count with binary units, e.g. `1.5K`.
pub fn bytes_to_string(bytes: u64) -> String {
    for i in (1..UNITS.len()).rev() {
        let step = 1024f64.powi(i as i32);
        if bytes as f64 > step {
            return format!("{:.1}{}", bytes as f64 / step, UNITS[i]);
        }
    }
    bytes.to_string()
}
