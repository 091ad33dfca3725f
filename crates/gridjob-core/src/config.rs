//! gridjob.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default port of the gridjobd HTTP API.
pub const DEFAULT_PORT: u16 = 8470;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// The cluster runs in the caller's process.
    Local,
    /// The cluster is reached over HTTP.
    #[default]
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub mode: ClusterMode,
    /// `host:port` of gridjobd; only used in remote mode.
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: ClusterMode::default(),
            address: default_address(),
        }
    }
}

/// Sizing of the per-job worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_prefix: default_thread_prefix(),
        }
    }
}

/// Job configuration defaults plus per-job overrides keyed by job name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub defaults: JobConfig,
    #[serde(default)]
    pub overrides: BTreeMap<String, JobConfig>,
}

/// Effective configuration of a single job, bound at init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Parallel processors per cluster member.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Items processed per scheduling chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Free-form properties passed through to the executor.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            chunk_size: default_chunk_size(),
            properties: BTreeMap::new(),
        }
    }
}

impl JobConfig {
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        if config.pool.worker_threads == 0 {
            anyhow::bail!("[pool].worker_threads must be at least 1");
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// In-process cluster with default pool and job settings.
    pub fn local() -> Self {
        Self {
            cluster: ClusterConfig {
                mode: ClusterMode::Local,
                address: default_address(),
            },
            ..Default::default()
        }
    }

    /// Resolve the configuration for job `name`: its override if one
    /// exists, otherwise the defaults.
    pub fn resolve_job_config(&self, name: &str) -> JobConfig {
        self.jobs
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.jobs.defaults.clone())
    }

    /// Scaffold a gridjob.toml pointing at a remote cluster.
    pub fn scaffold(address: &str) -> Self {
        Self {
            cluster: ClusterConfig {
                mode: ClusterMode::Remote,
                address: address.to_string(),
            },
            pool: PoolConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

fn default_address() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_worker_threads() -> usize {
    2
}

fn default_thread_prefix() -> String {
    "gridjob".to_string()
}

fn default_parallelism() -> u32 {
    4
}

fn default_chunk_size() -> u32 {
    256
}
