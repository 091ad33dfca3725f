//! Job control service — turns lifecycle intents into cluster operations
//! and drives the job state machine from their acknowledgments.
//!
//! Every operation runs on the job's worker pool and follows the same
//! shape under the per-job operation lock:
//!
//! 1. `ensure` the event is legal from the current state
//! 2. issue the cluster call and await its acknowledgment
//! 3. `transition` the state machine
//!
//! A failed cluster call leaves the state where it was.

use std::sync::Arc;

use gridjob_cluster::{ClusterError, ClusterRegistry, Transport};
use gridjob_core::{
    Accumulators, Dag, DeploymentResource, ExecutionOutcome, JobConfig, JobError, JobEvent,
    JobResult, JobState, JobStateMachine, Operation,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::future::JobFuture;
use crate::pool::WorkerPool;

#[derive(Clone)]
pub struct JobControlService {
    job: Arc<str>,
    state: Arc<JobStateMachine>,
    cluster: Arc<dyn ClusterRegistry>,
    pool: Arc<WorkerPool>,
    op_lock: Arc<Mutex<()>>,
}

impl JobControlService {
    pub fn new(
        state: Arc<JobStateMachine>,
        cluster: Arc<dyn ClusterRegistry>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            job: Arc::from(state.job()),
            state,
            cluster,
            pool,
            op_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn state(&self) -> JobState {
        self.state.current_state()
    }

    pub fn transport(&self) -> Transport {
        self.cluster.transport()
    }

    /// Register the job with the cluster.
    pub async fn init(&self, config: JobConfig) -> JobResult<JobState> {
        self.state.ensure(JobEvent::Init)?;
        let this = self.clone();
        self.pool
            .run(async move {
                let _guard = this.op_lock.lock().await;
                this.state.ensure(JobEvent::Init)?;
                this.cluster
                    .register_job(&this.job, &config)
                    .await
                    .map_err(|e| this.failed(Operation::Init, e))?;
                this.state.transition(JobEvent::Init)
            })
            .await
    }

    /// Ship the resource bundle to the cluster.
    pub async fn deploy(&self, resources: Vec<DeploymentResource>) -> JobResult<JobState> {
        self.state.ensure(JobEvent::Deploy)?;
        let this = self.clone();
        self.pool
            .run(async move {
                let _guard = this.op_lock.lock().await;
                this.state.ensure(JobEvent::Deploy)?;
                this.cluster
                    .deploy_resources(&this.job, &resources)
                    .await
                    .map_err(|e| this.failed(Operation::Deploy, e))?;
                this.state.transition(JobEvent::Deploy)
            })
            .await
    }

    /// Transmit the computation graph.
    pub async fn submit_graph(&self, graph: Dag) -> JobResult<JobState> {
        self.state.ensure(JobEvent::Submit)?;
        let this = self.clone();
        self.pool
            .run(async move {
                let _guard = this.op_lock.lock().await;
                this.state.ensure(JobEvent::Submit)?;
                this.cluster
                    .submit_graph(&this.job, &graph)
                    .await
                    .map_err(|e| this.failed(Operation::SubmitGraph, e))?;
                this.state.transition(JobEvent::Submit)
            })
            .await
    }

    /// Start execution. Resolves once the cluster acknowledged the start;
    /// the returned future resolves with the execution's outcome.
    ///
    /// Destroying the job before the outcome arrives fails the returned
    /// future with a `ControlOperation` error for `AwaitCompletion`.
    pub async fn execute(&self) -> JobResult<JobFuture<ExecutionOutcome>> {
        self.state.ensure(JobEvent::Execute)?;
        let this = self.clone();
        self.pool
            .run(async move {
                let _guard = this.op_lock.lock().await;
                this.state.ensure(JobEvent::Execute)?;
                this.cluster
                    .start_execution(&this.job)
                    .await
                    .map_err(|e| this.failed(Operation::Execute, e))?;
                this.state.transition(JobEvent::Execute)
            })
            .await?;

        let this = self.clone();
        let watcher = self.pool.spawn(async move { this.watch_completion().await });
        let job = Arc::clone(&self.job);
        Ok(JobFuture::new(async move {
            watcher.await.map_err(|e| {
                JobError::control(&job, Operation::AwaitCompletion, e.to_string())
            })?
        }))
    }

    async fn watch_completion(&self) -> JobResult<ExecutionOutcome> {
        let outcome = self
            .cluster
            .await_completion(&self.job)
            .await
            .map_err(|e| self.failed(Operation::AwaitCompletion, e))?;

        let event = match outcome {
            ExecutionOutcome::Completed => JobEvent::Complete,
            ExecutionOutcome::Failed { .. } => JobEvent::Fail,
            ExecutionOutcome::Interrupted => JobEvent::Interrupt,
        };

        let _guard = self.op_lock.lock().await;
        if let Err(e) = self.state.transition(event) {
            // An acknowledged interrupt or a destroy got there first.
            debug!(job = %self.job, ?outcome, error = %e, "completion left state unchanged");
        }
        info!(job = %self.job, ?outcome, "execution resolved");
        Ok(outcome)
    }

    /// Request cooperative cancellation. Resolves on acknowledgment.
    pub fn interrupt(&self) -> JobFuture<()> {
        if let Err(e) = self.state.ensure(JobEvent::Interrupt) {
            return JobFuture::ready(Err(e));
        }

        let this = self.clone();
        let task = self.pool.spawn(async move {
            let _guard = this.op_lock.lock().await;
            this.state.ensure(JobEvent::Interrupt)?;
            this.cluster
                .request_interrupt(&this.job)
                .await
                .map_err(|e| this.failed(Operation::Interrupt, e))?;
            match this.state.transition(JobEvent::Interrupt) {
                Ok(_) => Ok(()),
                Err(_) if this.state.current_state() == JobState::Interrupted => Ok(()),
                Err(e) => Err(e),
            }
        });

        let job = Arc::clone(&self.job);
        JobFuture::new(async move {
            task.await
                .map_err(|e| JobError::control(&job, Operation::Interrupt, e.to_string()))?
        })
    }

    /// Release all cluster-side state and shut the worker pool down.
    ///
    /// A second call resolves immediately. When the cluster-side destroy
    /// fails the state is left unchanged and the pool stays up, so the
    /// call can be retried.
    pub fn destroy(&self) -> JobFuture<()> {
        if self.state.current_state() == JobState::Destroyed {
            return JobFuture::ready(Ok(()));
        }

        let this = self.clone();
        let task = self.pool.spawn(async move {
            let _guard = this.op_lock.lock().await;
            if this.state.current_state() == JobState::Destroyed {
                return Ok(());
            }
            this.cluster
                .destroy_job(&this.job)
                .await
                .map_err(|e| JobError::Destroy {
                    job: this.job.to_string(),
                    source: e.into(),
                })?;
            this.state.transition(JobEvent::Destroy).map(|_| ())
        });

        let state = Arc::clone(&self.state);
        let pool = Arc::clone(&self.pool);
        let job = Arc::clone(&self.job);
        JobFuture::new(async move {
            let result = match task.await {
                Ok(result) => result,
                // The pool went away under a finished destroy.
                Err(_) if state.current_state() == JobState::Destroyed => Ok(()),
                Err(e) => Err(JobError::Destroy {
                    job: job.to_string(),
                    source: e.to_string().into(),
                }),
            };
            match &result {
                Ok(()) => pool.shutdown(),
                Err(e) => warn!(%job, error = %e, "destroy failed; cluster state may be leaked"),
            }
            result
        })
    }

    /// Current accumulator snapshot. Never changes the job state.
    pub async fn accumulators(&self) -> JobResult<Accumulators> {
        let state = self.state.current_state();
        if !state.has_started() {
            return Err(JobError::OperationNotPermitted {
                job: self.job.to_string(),
                state,
                operation: Operation::FetchAccumulators,
            });
        }

        let this = self.clone();
        self.pool
            .run(async move {
                this.cluster
                    .fetch_accumulators(&this.job)
                    .await
                    .map_err(|e| this.failed(Operation::FetchAccumulators, e))
            })
            .await
    }

    fn failed(&self, operation: Operation, source: ClusterError) -> JobError {
        JobError::control(&self.job, operation, source)
    }
}
