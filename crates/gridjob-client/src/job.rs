//! Job handle — the caller-facing object for one named job.

use std::sync::{Arc, Mutex, MutexGuard};

use gridjob_cluster::{ClusterRegistry, Transport};
use gridjob_core::{
    Accumulators, ClientConfig, CodeLoader, Dag, DeploymentResource, ExecutionOutcome, JobConfig,
    JobEvent, JobResult, JobState, JobStateMachine, validate_job_name,
};
use tracing::{info, warn};

use crate::bundle::ResourceBundle;
use crate::control::JobControlService;
use crate::future::JobFuture;
use crate::pool::WorkerPool;

/// Owns a job's resource bundle, state machine and control service.
///
/// Dropping the handle shuts its worker pool down without touching
/// cluster-side state; call [`destroy`](Self::destroy) to release that.
pub struct JobHandle {
    name: String,
    bundle: Mutex<ResourceBundle>,
    state: Arc<JobStateMachine>,
    control: JobControlService,
    pool: Arc<WorkerPool>,
    config: Arc<ClientConfig>,
    loader: Arc<dyn CodeLoader>,
}

impl JobHandle {
    pub fn new(
        name: &str,
        cluster: Arc<dyn ClusterRegistry>,
        config: Arc<ClientConfig>,
        loader: Arc<dyn CodeLoader>,
    ) -> JobResult<Self> {
        validate_job_name(name)?;
        let state = Arc::new(JobStateMachine::new(name));
        let pool = Arc::new(WorkerPool::new(name, &config.pool)?);
        let control = JobControlService::new(Arc::clone(&state), cluster, Arc::clone(&pool));
        Ok(Self {
            name: name.to_string(),
            bundle: Mutex::new(ResourceBundle::new(name)),
            state,
            control,
            pool,
            config,
            loader,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest known state. Never blocks.
    pub fn state(&self) -> JobState {
        self.state.current_state()
    }

    pub fn transport(&self) -> Transport {
        self.control.transport()
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Load code units by identifier. All load before any is added.
    pub fn add_code(&self, identifiers: &[&str]) -> JobResult<usize> {
        self.bundle().add_code(self.loader.as_ref(), identifiers)
    }

    pub fn add_code_bytes(&self, identifier: &str, bytes: Vec<u8>) -> JobResult<bool> {
        self.bundle().add_code_bytes(identifier, bytes)
    }

    pub fn add_code_from(&self, locator: &str, name: &str) -> JobResult<bool> {
        self.bundle().add_code_from(locator, name)
    }

    pub fn add_archive(&self, locator: &str, name: Option<&str>) -> JobResult<bool> {
        self.bundle().add_archive(locator, name)
    }

    pub fn add_data(&self, locator: &str, name: Option<&str>) -> JobResult<bool> {
        self.bundle().add_data(locator, name)
    }

    pub fn resources(&self) -> Vec<DeploymentResource> {
        self.bundle().to_vec()
    }

    pub fn resource_count(&self) -> usize {
        self.bundle().len()
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Register the job. `None` resolves the configuration by job name.
    pub async fn init(&self, config: Option<JobConfig>) -> JobResult<JobState> {
        let config = config.unwrap_or_else(|| self.config.resolve_job_config(&self.name));
        self.control.init(config).await
    }

    /// Deploy the bundle, then transmit `graph`.
    ///
    /// The bundle is frozen while deploying. If the cluster refuses the
    /// deployment it is reopened so resources can be added before retrying.
    /// When an earlier submit already deployed, only the graph is sent.
    pub async fn submit(&self, graph: Dag) -> JobResult<JobState> {
        if self.state() != JobState::Deployed {
            self.state.ensure(JobEvent::Deploy)?;
            let resources = {
                let mut bundle = self.bundle();
                bundle.freeze();
                bundle.to_vec()
            };
            if let Err(e) = self.control.deploy(resources).await {
                if self.state() == JobState::Initialized {
                    self.bundle().thaw();
                }
                return Err(e);
            }
        }
        self.control.submit_graph(graph).await
    }

    /// Start execution; the returned future resolves with its outcome.
    pub async fn execute(&self) -> JobResult<JobFuture<ExecutionOutcome>> {
        self.control.execute().await
    }

    pub fn interrupt(&self) -> JobFuture<()> {
        self.control.interrupt()
    }

    /// Clear the local bundle, then release cluster-side state.
    ///
    /// The bundle is cleared even when the cluster-side destroy fails.
    pub fn destroy(&self) -> JobFuture<()> {
        {
            let mut bundle = self.bundle();
            bundle.freeze();
            bundle.clear();
        }
        info!(job = %self.name, "destroying job");
        self.control.destroy()
    }

    pub async fn accumulators(&self) -> JobResult<Accumulators> {
        self.control.accumulators().await
    }

    fn bundle(&self) -> MutexGuard<'_, ResourceBundle> {
        self.bundle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        let state = self.state();
        if state != JobState::Destroyed && state != JobState::Unstarted {
            warn!(job = %self.name, %state, "job handle dropped without destroy");
        }
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("transport", &self.transport())
            .finish_non_exhaustive()
    }
}
