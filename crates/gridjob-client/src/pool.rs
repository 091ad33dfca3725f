//! Worker pool — the private tokio runtime a job handle runs its control
//! operations on.
//!
//! Threads are named `{prefix}-{job}-{n}`. Shutdown never blocks the
//! caller, so a pool can be dropped from inside another runtime.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gridjob_core::{JobError, JobResult, PoolConfig};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct WorkerPool {
    job: String,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl WorkerPool {
    pub fn new(job: &str, config: &PoolConfig) -> JobResult<Self> {
        let prefix = format!("{}-{}", config.thread_prefix, job);
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                format!("{prefix}-{n}")
            })
            .enable_all()
            .build()
            .map_err(|source| JobError::WorkerPool {
                job: job.to_string(),
                source,
            })?;
        debug!(%job, workers = config.worker_threads, "worker pool started");
        Ok(Self {
            job: job.to_string(),
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Run `future` on the pool.
    ///
    /// After [`shutdown`](Self::shutdown) the returned handle resolves to a
    /// cancelled `JoinError`.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run `future` on the pool and wait for its output.
    pub async fn run<F, T>(&self, future: F) -> JobResult<T>
    where
        F: Future<Output = JobResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.spawn(future).await {
            Ok(result) => result,
            Err(e) => Err(JobError::WorkerPool {
                job: self.job.clone(),
                source: std::io::Error::other(e.to_string()),
            }),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().is_none()
    }

    /// Stop the pool in the background. Idempotent.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.lock().take() {
            runtime.shutdown_background();
            debug!(job = %self.job, "worker pool shut down");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
