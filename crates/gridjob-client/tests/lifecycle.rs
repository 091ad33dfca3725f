//! End-to-end lifecycle tests against an in-process cluster.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gridjob_client::GridClient;
use gridjob_cluster::{
    ClusterError, ClusterFuture, ClusterRegistry, ExecutionContext, ExecutionFuture, GraphExecutor,
    LocalCluster, NoopExecutor, Transport,
};
use gridjob_core::{
    Accumulator, Accumulators, ClientConfig, Dag, DeploymentResource, ExecutionOutcome,
    FsCodeLoader, JobConfig, JobError, JobState, Operation, ResourceError, ResourceType,
};
use serde_json::json;

/// Counts ticks until interrupted.
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
        Box::pin(async { Err("out of memory".to_string()) })
    }
}

/// Delegates to a local cluster but fails the first destroy.
struct FlakyDestroy {
    inner: LocalCluster,
    failed_once: AtomicBool,
}

impl ClusterRegistry for FlakyDestroy {
    fn register_job<'a>(&'a self, job: &'a str, config: &'a JobConfig) -> ClusterFuture<'a, ()> {
        self.inner.register_job(job, config)
    }

    fn deploy_resources<'a>(
        &'a self,
        job: &'a str,
        resources: &'a [DeploymentResource],
    ) -> ClusterFuture<'a, ()> {
        self.inner.deploy_resources(job, resources)
    }

    fn submit_graph<'a>(&'a self, job: &'a str, graph: &'a Dag) -> ClusterFuture<'a, ()> {
        self.inner.submit_graph(job, graph)
    }

    fn start_execution<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        self.inner.start_execution(job)
    }

    fn await_completion<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ExecutionOutcome> {
        self.inner.await_completion(job)
    }

    fn request_interrupt<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        self.inner.request_interrupt(job)
    }

    fn destroy_job<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, ()> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Box::pin(async { Err(ClusterError::Transport("connection reset".to_string())) });
        }
        self.inner.destroy_job(job)
    }

    fn fetch_accumulators<'a>(&'a self, job: &'a str) -> ClusterFuture<'a, Accumulators> {
        self.inner.fetch_accumulators(job)
    }

    fn transport(&self) -> Transport {
        Transport::Remote
    }
}

fn local(executor: Arc<dyn GraphExecutor>) -> (GridClient, Arc<LocalCluster>) {
    let cluster = Arc::new(LocalCluster::in_memory(executor).unwrap());
    let client = GridClient::local(Arc::clone(&cluster), ClientConfig::local());
    (client, cluster)
}

fn graph() -> Dag {
    Dag::new(json!({ "vertices": ["source", "tokenize", "sink"] }))
}

#[tokio::test]
async fn scenario_a_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("tokenizer.zip");
    std::fs::write(&archive, b"PK\x03\x04").unwrap();

    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("wordcount").unwrap();
    assert_eq!(job.state(), JobState::Unstarted);
    assert_eq!(job.transport(), Transport::Local);

    job.init(Some(JobConfig::default())).await.unwrap();
    job.add_archive(archive.to_str().unwrap(), None).unwrap();
    job.submit(graph().referencing("tokenizer.zip")).await.unwrap();
    assert_eq!(job.state(), JobState::Submitted);

    let outcome = job.execute().await.unwrap().await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(job.state(), JobState::Completed);

    let acc = job.accumulators().await.unwrap();
    assert_eq!(acc["resources.deployed"], Accumulator::Long(1));

    job.destroy().await.unwrap();
    assert_eq!(job.state(), JobState::Destroyed);
    assert_eq!(job.resource_count(), 0);
}

#[tokio::test]
async fn scenario_b_interrupt_wins_over_completion() {
    let (client, _cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("spin").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();

    let execution = job.execute().await.unwrap();
    assert_eq!(job.state(), JobState::Running);

    job.interrupt().await.unwrap();
    assert_eq!(job.state(), JobState::Interrupted);

    let outcome = execution.await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Interrupted);
    assert_eq!(job.state(), JobState::Interrupted);

    job.destroy().await.unwrap();
}

#[tokio::test]
async fn scenario_c_unreadable_code_leaves_bundle_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let client = client.with_code_loader(Arc::new(FsCodeLoader::new(dir.path())));
    let job = client.job("wordcount").unwrap();

    let err = job.add_code(&["com.acme.Missing"]).unwrap_err();
    assert!(matches!(err, JobError::Resource(ResourceError::Unreadable { .. })));
    assert_eq!(job.resource_count(), 0);
}

#[tokio::test]
async fn add_code_resolves_dotted_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("com/acme")).unwrap();
    std::fs::write(dir.path().join("com/acme/Tokenizer"), b"tok").unwrap();

    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let client = client.with_code_loader(Arc::new(FsCodeLoader::new(dir.path())));
    let job = client.job("wordcount").unwrap();

    assert_eq!(job.add_code(&["com.acme.Tokenizer"]).unwrap(), 1);
    assert_eq!(job.resources()[0].name(), "com.acme.Tokenizer");
}

#[tokio::test]
async fn destroy_twice_resolves_both_times() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("twice").unwrap();
    job.init(None).await.unwrap();

    job.destroy().await.unwrap();
    job.destroy().await.unwrap();
    assert_eq!(job.state(), JobState::Destroyed);
}

#[tokio::test]
async fn destroy_before_init_is_allowed() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("early").unwrap();
    job.destroy().await.unwrap();
    assert_eq!(job.state(), JobState::Destroyed);

    let err = job.init(None).await.unwrap_err();
    assert!(matches!(err, JobError::IllegalStateTransition { .. }));
}

#[tokio::test]
async fn submit_before_init_is_illegal() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("eager").unwrap();

    let err = job.submit(graph()).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::IllegalStateTransition { state: JobState::Unstarted, .. }
    ));
    assert_eq!(job.state(), JobState::Unstarted);

    // The bundle is still open.
    job.add_code_bytes("lib", b"code".to_vec()).unwrap();
}

#[tokio::test]
async fn execute_before_submit_is_illegal() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("hasty").unwrap();
    job.init(None).await.unwrap();

    let err = job.execute().await.unwrap_err();
    assert!(err.is_illegal_state());
    assert_eq!(job.state(), JobState::Initialized);
}

#[tokio::test]
async fn second_execute_is_illegal() {
    let (client, _cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("spin").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();
    let _execution = job.execute().await.unwrap();

    let err = job.execute().await.unwrap_err();
    assert!(matches!(
        err,
        JobError::IllegalStateTransition { state: JobState::Running, .. }
    ));
    job.destroy().await.unwrap();
}

#[tokio::test]
async fn accumulators_require_started_execution() {
    let (client, _cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("spin").unwrap();
    job.init(None).await.unwrap();

    let err = job.accumulators().await.unwrap_err();
    assert!(matches!(err, JobError::OperationNotPermitted { .. }));

    job.submit(graph()).await.unwrap();
    let _execution = job.execute().await.unwrap();
    job.accumulators().await.unwrap();
    assert_eq!(job.state(), JobState::Running);

    job.destroy().await.unwrap();
    let err = job.accumulators().await.unwrap_err();
    assert!(err.is_illegal_state());
}

#[tokio::test]
async fn bundle_is_frozen_after_submit() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("frozen").unwrap();
    job.add_code_bytes("lib", b"code".to_vec()).unwrap();
    job.init(None).await.unwrap();
    job.submit(graph().referencing("lib")).await.unwrap();

    let err = job.add_code_bytes("late", b"x".to_vec()).unwrap_err();
    assert!(matches!(err, JobError::BundleFrozen { .. }));
    assert_eq!(job.resource_count(), 1);
}

#[tokio::test]
async fn rejected_graph_keeps_deployed_state_and_resubmit_skips_deploy() {
    let (client, cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("retry").unwrap();
    job.add_code_bytes("lib", b"code".to_vec()).unwrap();
    job.init(None).await.unwrap();

    let err = job.submit(graph().referencing("missing")).await.unwrap_err();
    assert!(matches!(err, JobError::ControlOperation { .. }));
    assert_eq!(job.state(), JobState::Deployed);

    job.submit(graph().referencing("lib")).await.unwrap();
    assert_eq!(job.state(), JobState::Submitted);
    assert_eq!(cluster.store().list_resources_for_job("retry").unwrap().len(), 1);
}

#[tokio::test]
async fn executor_failure_moves_to_failed() {
    let (client, _cluster) = local(Arc::new(FailingExecutor));
    let job = client.job("doomed").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();

    let outcome = job.execute().await.unwrap().await.unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::Failed {
            reason: "out of memory".to_string()
        }
    );
    assert_eq!(job.state(), JobState::Failed);
}

#[tokio::test]
async fn concurrent_interrupts_apply_once() {
    let (client, _cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("spin").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();
    let execution = job.execute().await.unwrap();

    let handles: Vec<_> = (0..8).map(|_| job.interrupt()).collect();
    let mut ok = 0;
    for h in handles {
        match h.await {
            Ok(()) => ok += 1,
            Err(e) => assert!(e.is_illegal_state(), "unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(execution.await.unwrap(), ExecutionOutcome::Interrupted);
    assert_eq!(job.state(), JobState::Interrupted);
}

#[tokio::test]
async fn init_without_config_uses_job_override() {
    let mut config = ClientConfig::local();
    config
        .jobs
        .overrides
        .insert("tuned".to_string(), JobConfig::default().with_property("input", "words.txt"));
    let cluster = Arc::new(LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap());
    let client = GridClient::local(Arc::clone(&cluster), config);

    let job = client.job("tuned").unwrap();
    job.init(None).await.unwrap();

    let record = cluster.store().get_job("tuned").unwrap().unwrap();
    assert_eq!(record.config.properties["input"], "words.txt");
}

#[tokio::test]
async fn failed_destroy_clears_bundle_and_can_be_retried() {
    let registry = Arc::new(FlakyDestroy {
        inner: LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap(),
        failed_once: AtomicBool::new(false),
    });
    let client = GridClient::with_registry(registry, ClientConfig::local());
    let job = client.job("leaky").unwrap();
    job.add_code_bytes("lib", b"code".to_vec()).unwrap();
    job.init(None).await.unwrap();

    let err = job.destroy().await.unwrap_err();
    assert!(matches!(err, JobError::Destroy { .. }));
    assert_eq!(job.resource_count(), 0);
    assert_eq!(job.state(), JobState::Initialized);

    job.destroy().await.unwrap();
    assert_eq!(job.state(), JobState::Destroyed);
}

#[tokio::test]
async fn invalid_job_name_is_rejected() {
    let (client, _cluster) = local(Arc::new(NoopExecutor));
    let err = client.job("no/slashes").unwrap_err();
    assert!(matches!(err, JobError::InvalidJobName(_)));
}

#[tokio::test]
async fn destroy_while_running_fails_the_pending_execution() {
    let (client, cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("doomed").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();
    let execution = job.execute().await.unwrap();
    assert_eq!(cluster.active_jobs(), 1);

    job.destroy().await.unwrap();
    assert_eq!(job.state(), JobState::Destroyed);
    assert_eq!(cluster.active_jobs(), 0);

    let err = tokio::time::timeout(Duration::from_secs(2), execution)
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        JobError::ControlOperation {
            operation: Operation::AwaitCompletion,
            ..
        }
    ));
    assert_eq!(job.state(), JobState::Destroyed);
}

#[tokio::test]
async fn dropped_handle_leaves_execution_with_the_cluster() {
    let (client, cluster) = local(Arc::new(SpinExecutor));
    let job = client.job("orphan").unwrap();
    job.init(None).await.unwrap();
    job.submit(graph()).await.unwrap();
    let execution = job.execute().await.unwrap();
    drop(execution);
    drop(job);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cluster.active_jobs(), 1);

    cluster.request_interrupt("orphan").await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), cluster.await_completion("orphan"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Interrupted);
    assert_eq!(cluster.active_jobs(), 0);
}

#[tokio::test]
async fn refused_deploy_reopens_the_bundle() {
    let (client, cluster) = local(Arc::new(NoopExecutor));
    let job = client.job("clash").unwrap();
    job.add_code_bytes("lib", b"new".to_vec()).unwrap();
    job.init(None).await.unwrap();

    let stale = DeploymentResource::inline("lib", ResourceType::Code, b"old".to_vec()).unwrap();
    cluster.deploy_resources("clash", &[stale]).await.unwrap();

    let err = job.submit(graph().referencing("lib")).await.unwrap_err();
    assert!(matches!(err, JobError::ControlOperation { .. }));
    assert_eq!(job.state(), JobState::Initialized);

    assert!(job.add_data("https://data.example.com/extra.csv", None).unwrap());
    assert_eq!(job.resource_count(), 2);
}
