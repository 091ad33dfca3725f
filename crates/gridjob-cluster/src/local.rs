//! In-process cluster backed by the redb registry store.
//!
//! `LocalCluster` is the authoritative side of the job lifecycle: it keeps
//! job records, deployed resources and graphs in a [`RegistryStore`] and
//! drives one [`GraphExecutor`] task per running job.
//!
//! Mutating operations run under a single mutex held only across
//! synchronous store calls. The executor task decides the final outcome
//! under that same mutex, which keeps an acknowledged interrupt and a
//! concurrent completion from both taking effect.
//!
//! Executions are spawned on the runtime captured at construction, never on
//! the caller's, so they outlive the client that started them.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use gridjob_core::{
    Accumulators, Dag, DeploymentResource, ExecutionOutcome, JobConfig, validate_job_name,
};
use gridjob_state::{ClusterJobStatus, JobRecord, RegistryStore, epoch_secs};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::executor::{AccumulatorSink, ExecutionContext, ExecutionFuture, GraphExecutor};
use crate::registry::{ClusterFuture, ClusterRegistry, Transport};

/// Bookkeeping for one started execution.
struct RunSlot {
    interrupt_tx: watch::Sender<bool>,
    outcome_tx: watch::Sender<Option<ExecutionOutcome>>,
    accumulators: AccumulatorSink,
    handle: JoinHandle<()>,
}

impl RunSlot {
    fn is_finished(&self) -> bool {
        self.outcome_tx.borrow().is_some()
    }
}

type Runs = HashMap<String, RunSlot>;

/// Cluster registry living in the caller's process.
#[derive(Clone)]
pub struct LocalCluster {
    store: RegistryStore,
    executor: Arc<dyn GraphExecutor>,
    runtime: Handle,
    runs: Arc<Mutex<Runs>>,
}

impl LocalCluster {
    /// Build a cluster whose executions run on the current tokio runtime.
    pub fn new(store: RegistryStore, executor: Arc<dyn GraphExecutor>) -> ClusterResult<Self> {
        let runtime = Handle::try_current().map_err(|e| ClusterError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(store, executor, runtime))
    }

    /// Build a cluster whose executions run on `runtime`.
    pub fn with_runtime(
        store: RegistryStore,
        executor: Arc<dyn GraphExecutor>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            executor,
            runtime,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ephemeral cluster for tests and embedded use.
    pub fn in_memory(executor: Arc<dyn GraphExecutor>) -> ClusterResult<Self> {
        Self::new(RegistryStore::open_in_memory()?, executor)
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// All job records known to the registry.
    pub fn list_jobs(&self) -> ClusterResult<Vec<JobRecord>> {
        Ok(self.store.list_jobs()?)
    }

    /// Number of jobs with an execution in flight.
    pub fn active_jobs(&self) -> usize {
        self.lock_runs().values().filter(|slot| !slot.is_finished()).count()
    }

    fn lock_runs(&self) -> MutexGuard<'_, Runs> {
        lock_runs(&self.runs)
    }

    fn require_job(&self, job: &str) -> ClusterResult<JobRecord> {
        check_name(job)?;
        self.store
            .get_job(job)?
            .ok_or_else(|| ClusterError::JobNotFound(job.to_string()))
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    fn register(&self, job: &str, config: &JobConfig) -> ClusterResult<()> {
        check_name(job)?;
        let _runs = self.lock_runs();
        let now = epoch_secs();
        let record = match self.store.get_job(job)? {
            Some(existing) if existing.status != ClusterJobStatus::Registered => {
                return Err(ClusterError::JobAlreadyExists(job.to_string()));
            }
            Some(mut existing) => {
                existing.config = config.clone();
                existing.updated_at = now;
                existing
            }
            None => JobRecord::new(job, config.clone(), now),
        };
        self.store.put_job(&record)?;
        info!(%job, parallelism = config.parallelism, "job registered");
        Ok(())
    }

    fn deploy(&self, job: &str, resources: &[DeploymentResource]) -> ClusterResult<()> {
        let _runs = self.lock_runs();
        let mut record = self.require_job(job)?;
        if !matches!(
            record.status,
            ClusterJobStatus::Registered | ClusterJobStatus::Deployed
        ) {
            return Err(invalid(&record, "deploy", "registered or deployed"));
        }

        // Validate the whole batch before writing any of it.
        for res in resources {
            if let Some(existing) = self.store.get_resource(job, res.name())?
                && !existing.same_content(res)
            {
                return Err(ClusterError::ResourceConflict {
                    job: job.to_string(),
                    name: res.name().to_string(),
                });
            }
        }

        self.store.put_resources(job, resources)?;
        record.advance(ClusterJobStatus::Deployed, epoch_secs());
        self.store.put_job(&record)?;
        info!(%job, resources = resources.len(), "resources deployed");
        Ok(())
    }

    fn submit(&self, job: &str, graph: &Dag) -> ClusterResult<()> {
        let _runs = self.lock_runs();
        let mut record = self.require_job(job)?;
        if record.status != ClusterJobStatus::Deployed {
            return Err(invalid(&record, "submit", "deployed"));
        }

        let deployed: BTreeSet<String> = self
            .store
            .list_resources_for_job(job)?
            .into_iter()
            .map(|r| r.name().to_string())
            .collect();
        let missing: Vec<String> = graph.references().difference(&deployed).cloned().collect();
        if !missing.is_empty() {
            return Err(ClusterError::GraphRejected {
                job: job.to_string(),
                missing,
            });
        }

        self.store.put_graph(job, graph)?;
        record.advance(ClusterJobStatus::Submitted, epoch_secs());
        self.store.put_job(&record)?;
        info!(%job, graph_bytes = graph.encoded_len(), "graph submitted");
        Ok(())
    }

    fn start(&self, job: &str) -> ClusterResult<()> {
        let mut runs = self.lock_runs();
        let mut record = self.require_job(job)?;
        if record.execution_started {
            return Err(ClusterError::ExecutionAlreadyStarted(job.to_string()));
        }
        if record.status != ClusterJobStatus::Submitted {
            return Err(invalid(&record, "start", "submitted"));
        }
        let graph = self
            .store
            .get_graph(job)?
            .ok_or_else(|| invalid(&record, "start", "a submitted graph"))?;
        let resources = self.store.list_resources_for_job(job)?;

        record.execution_started = true;
        record.advance(ClusterJobStatus::Running, epoch_secs());
        self.store.put_job(&record)?;

        let (interrupt_tx, interrupt_rx) = watch::channel(false);
        let (outcome_tx, _) = watch::channel(None);
        let accumulators = AccumulatorSink::new();

        let execution = self.executor.execute(ExecutionContext {
            job: job.to_string(),
            config: record.config.clone(),
            graph,
            resources,
            accumulators: accumulators.clone(),
        });

        let handle = self.runtime.spawn(run_execution(
            job.to_string(),
            execution,
            interrupt_rx,
            Arc::clone(&self.runs),
            self.store.clone(),
        ));

        runs.insert(
            job.to_string(),
            RunSlot {
                interrupt_tx,
                outcome_tx,
                accumulators,
                handle,
            },
        );
        info!(%job, "execution started");
        Ok(())
    }

    async fn wait_for_outcome(&self, job: &str) -> ClusterResult<ExecutionOutcome> {
        let mut outcome_rx = {
            let runs = self.lock_runs();
            match runs.get(job) {
                Some(slot) => slot.outcome_tx.subscribe(),
                None => {
                    drop(runs);
                    return self.stored_outcome(job);
                }
            }
        };

        let outcome = outcome_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ClusterError::JobNotFound(job.to_string()))?;
        outcome
            .clone()
            .ok_or_else(|| ClusterError::NotRunning(job.to_string()))
    }

    /// Outcome of a job with no run slot, read back from its record.
    fn stored_outcome(&self, job: &str) -> ClusterResult<ExecutionOutcome> {
        let record = self.require_job(job)?;
        match record.status {
            ClusterJobStatus::Completed => Ok(ExecutionOutcome::Completed),
            ClusterJobStatus::Interrupted => Ok(ExecutionOutcome::Interrupted),
            ClusterJobStatus::Failed => Ok(ExecutionOutcome::Failed {
                reason: record.failure.unwrap_or_default(),
            }),
            _ => Err(ClusterError::NotRunning(job.to_string())),
        }
    }

    fn interrupt(&self, job: &str) -> ClusterResult<()> {
        let runs = self.lock_runs();
        let Some(slot) = runs.get(job) else {
            self.require_job(job)?;
            return Err(ClusterError::NotRunning(job.to_string()));
        };
        if slot.is_finished() {
            return Err(ClusterError::NotRunning(job.to_string()));
        }
        slot.interrupt_tx.send_replace(true);
        info!(%job, "interrupt acknowledged");
        Ok(())
    }

    fn destroy(&self, job: &str) -> ClusterResult<()> {
        check_name(job)?;
        let slot = self.lock_runs().remove(job);
        if let Some(slot) = slot {
            slot.handle.abort();
        }
        let existed = self.store.purge_job(job)?;
        if existed {
            info!(%job, "job destroyed");
        } else {
            debug!(%job, "destroy of unknown job ignored");
        }
        Ok(())
    }

    fn accumulators(&self, job: &str) -> ClusterResult<Accumulators> {
        if let Some(slot) = self.lock_runs().get(job) {
            return Ok(slot.accumulators.snapshot());
        }
        match self.store.get_accumulators(job)? {
            Some(snapshot) => Ok(snapshot),
            None => {
                self.require_job(job)?;
                Ok(Accumulators::new())
            }
        }
    }
}

impl ClusterRegistry for LocalCluster {
    fn register_job<'a>(&'a self, job: &'a str, config: &'a JobConfig) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.register(job, config) })
    }

    fn deploy_resources<'a>(
        &'a self,
        job: &'a str,
        resources: &'a [DeploymentResource],
    ) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.deploy(job, resources) })
    }

    fn submit_graph<'a>(&'a self, job: &'a str, graph: &'a Dag) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.submit(job, graph) })
    }

    fn start_execution<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.start(job) })
    }

    fn await_completion<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ExecutionOutcome> {
        Box::pin(self.wait_for_outcome(job))
    }

    fn request_interrupt<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.interrupt(job) })
    }

    fn destroy_job<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        Box::pin(async move { self.destroy(job) })
    }

    fn fetch_accumulators<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, Accumulators> {
        Box::pin(async move { self.accumulators(job) })
    }

    fn transport(&self) -> Transport {
        Transport::Local
    }
}

fn lock_runs(runs: &Mutex<Runs>) -> MutexGuard<'_, Runs> {
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Names key the registry tables and must not collide with their separators.
fn check_name(job: &str) -> ClusterResult<()> {
    validate_job_name(job).map_err(|_| ClusterError::InvalidJobName(job.to_string()))
}

fn invalid(record: &JobRecord, operation: &'static str, expected: &'static str) -> ClusterError {
    ClusterError::InvalidStatus {
        job: record.name.clone(),
        status: record.status,
        operation,
        expected,
    }
}

/// Drive one execution until it finishes or is interrupted, then publish
/// the outcome.
async fn run_execution(
    job: String,
    execution: ExecutionFuture,
    mut interrupt_rx: watch::Receiver<bool>,
    runs: Arc<Mutex<Runs>>,
    store: RegistryStore,
) {
    let result = tokio::select! {
        biased;
        _ = interrupted(&mut interrupt_rx) => None,
        result = execution => Some(result),
    };

    let runs = lock_runs(&runs);
    let Some(slot) = runs.get(&job) else {
        // Destroyed while running.
        return;
    };

    let outcome = if *slot.interrupt_tx.borrow() {
        ExecutionOutcome::Interrupted
    } else {
        match result {
            Some(Ok(())) => ExecutionOutcome::Completed,
            Some(Err(reason)) => ExecutionOutcome::Failed { reason },
            None => ExecutionOutcome::Interrupted,
        }
    };

    if let Err(e) = persist_outcome(&store, &job, &outcome, &slot.accumulators.snapshot()) {
        warn!(%job, error = %e, "failed to persist execution outcome");
    }
    info!(%job, ?outcome, "execution finished");
    slot.outcome_tx.send_replace(Some(outcome));
}

async fn interrupted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        // Sender gone means the slot was removed; the task is being aborted.
        std::future::pending::<()>().await;
    }
}

fn persist_outcome(
    store: &RegistryStore,
    job: &str,
    outcome: &ExecutionOutcome,
    accumulators: &Accumulators,
) -> ClusterResult<()> {
    if let Some(mut record) = store.get_job(job)? {
        let (status, failure) = match outcome {
            ExecutionOutcome::Completed => (ClusterJobStatus::Completed, None),
            ExecutionOutcome::Failed { reason } => (ClusterJobStatus::Failed, Some(reason.clone())),
            ExecutionOutcome::Interrupted => (ClusterJobStatus::Interrupted, None),
        };
        record.failure = failure;
        record.advance(status, epoch_secs());
        store.put_job(&record)?;
    }
    store.put_accumulators(job, accumulators)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NoopExecutor;
    use gridjob_core::{Accumulator, ResourceType};
    use serde_json::json;
    use std::time::Duration;

    /// Runs until interrupted, counting ticks.
    struct SpinExecutor;

    impl GraphExecutor for SpinExecutor {
        fn execute(&self, ctx: ExecutionContext) -> ExecutionFuture {
            Box::pin(async move {
                loop {
                    ctx.accumulators.add("ticks", Accumulator::Long(1));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        }
    }

    struct FailingExecutor;

    impl GraphExecutor for FailingExecutor {
        fn execute(&self, _ctx: ExecutionContext) -> ExecutionFuture {
            Box::pin(async { Err("disk full".to_string()) })
        }
    }

    fn resource(name: &str, content: &[u8]) -> DeploymentResource {
        DeploymentResource::inline(name, ResourceType::Code, content.to_vec()).unwrap()
    }

    async fn submitted(cluster: &LocalCluster, job: &str) {
        cluster.register_job(job, &JobConfig::default()).await.unwrap();
        cluster
            .deploy_resources(job, &[resource("lib", b"code")])
            .await
            .unwrap();
        cluster
            .submit_graph(job, &Dag::new(json!({ "v": 1 })).referencing("lib"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_lifecycle_completes() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        submitted(&cluster, "wc").await;

        cluster.start_execution("wc").await.unwrap();
        let outcome = cluster.await_completion("wc").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);

        let record = cluster.store().get_job("wc").unwrap().unwrap();
        assert_eq!(record.status, ClusterJobStatus::Completed);

        let acc = cluster.fetch_accumulators("wc").await.unwrap();
        assert_eq!(acc["resources.deployed"], Accumulator::Long(1));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        submitted(&cluster, "wc").await;

        cluster.start_execution("wc").await.unwrap();
        let err = cluster.start_execution("wc").await.unwrap_err();
        assert!(matches!(err, ClusterError::ExecutionAlreadyStarted(_)));
    }

    #[tokio::test]
    async fn graph_with_undeployed_reference_is_rejected() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        cluster.register_job("wc", &JobConfig::default()).await.unwrap();
        cluster.deploy_resources("wc", &[]).await.unwrap();

        let dag = Dag::new(json!({})).referencing("missing.zip");
        let err = cluster.submit_graph("wc", &dag).await.unwrap_err();
        match err {
            ClusterError::GraphRejected { missing, .. } => assert_eq!(missing, vec!["missing.zip"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn redeploy_same_content_is_idempotent() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        cluster.register_job("wc", &JobConfig::default()).await.unwrap();
        cluster.deploy_resources("wc", &[resource("lib", b"a")]).await.unwrap();
        cluster.deploy_resources("wc", &[resource("lib", b"a")]).await.unwrap();

        let err = cluster
            .deploy_resources("wc", &[resource("lib", b"b")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ResourceConflict { .. }));
    }

    #[tokio::test]
    async fn register_is_idempotent_until_deployed() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        cluster.register_job("wc", &JobConfig::default()).await.unwrap();
        cluster.register_job("wc", &JobConfig::default()).await.unwrap();
        cluster.deploy_resources("wc", &[]).await.unwrap();

        let err = cluster.register_job("wc", &JobConfig::default()).await.unwrap_err();
        assert!(matches!(err, ClusterError::JobAlreadyExists(_)));
    }

    #[tokio::test]
    async fn interrupt_stops_running_execution() {
        let cluster = LocalCluster::in_memory(Arc::new(SpinExecutor)).unwrap();
        submitted(&cluster, "spin").await;
        cluster.start_execution("spin").await.unwrap();
        assert_eq!(cluster.active_jobs(), 1);

        cluster.request_interrupt("spin").await.unwrap();
        let outcome = cluster.await_completion("spin").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Interrupted);
        assert_eq!(cluster.active_jobs(), 0);

        let err = cluster.request_interrupt("spin").await.unwrap_err();
        assert!(matches!(err, ClusterError::NotRunning(_)));
    }

    #[tokio::test]
    async fn executor_failure_is_reported() {
        let cluster = LocalCluster::in_memory(Arc::new(FailingExecutor)).unwrap();
        submitted(&cluster, "bad").await;
        cluster.start_execution("bad").await.unwrap();

        let outcome = cluster.await_completion("bad").await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed {
                reason: "disk full".to_string()
            }
        );
        let record = cluster.store().get_job("bad").unwrap().unwrap();
        assert_eq!(record.failure.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_purges() {
        let cluster = LocalCluster::in_memory(Arc::new(SpinExecutor)).unwrap();
        submitted(&cluster, "spin").await;
        cluster.start_execution("spin").await.unwrap();

        cluster.destroy_job("spin").await.unwrap();
        cluster.destroy_job("spin").await.unwrap();
        cluster.destroy_job("never-existed").await.unwrap();

        assert!(cluster.store().get_job("spin").unwrap().is_none());
        assert!(matches!(
            cluster.fetch_accumulators("spin").await.unwrap_err(),
            ClusterError::JobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn names_with_separators_are_rejected() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        cluster.register_job("a", &JobConfig::default()).await.unwrap();

        for op in [
            cluster.register_job("a:b", &JobConfig::default()).await,
            cluster.deploy_resources("a:b", &[resource("lib", b"x")]).await,
            cluster.destroy_job("a:b").await,
        ] {
            assert!(matches!(op.unwrap_err(), ClusterError::InvalidJobName(_)));
        }
        assert_eq!(cluster.list_jobs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execution_outlives_the_starting_runtime() {
        let cluster = LocalCluster::in_memory(Arc::new(SpinExecutor)).unwrap();
        submitted(&cluster, "spin").await;

        let starter = cluster.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(starter.start_execution("spin")).unwrap();
        })
        .join()
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cluster.active_jobs(), 1);
        assert!(!cluster.fetch_accumulators("spin").await.unwrap().is_empty());

        cluster.request_interrupt("spin").await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), cluster.await_completion("spin"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Interrupted);
        assert_eq!(cluster.active_jobs(), 0);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
        assert!(matches!(
            cluster.start_execution("ghost").await.unwrap_err(),
            ClusterError::JobNotFound(_)
        ));
        assert!(matches!(
            cluster.request_interrupt("ghost").await.unwrap_err(),
            ClusterError::JobNotFound(_)
        ));
    }
}
