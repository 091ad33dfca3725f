//! Seam to the engine that actually runs a submitted graph.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use gridjob_core::{Accumulator, Accumulators, Dag, DeploymentResource, JobConfig};

/// Future returned by [`GraphExecutor::execute`]. `Err` carries the failure reason.
pub type ExecutionFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// Everything an executor needs to run one job.
pub struct ExecutionContext {
    pub job: String,
    pub config: JobConfig,
    pub graph: Dag,
    pub resources: Vec<DeploymentResource>,
    pub accumulators: AccumulatorSink,
}

/// Runs graphs. The returned future is dropped at its next await point
/// when the job is interrupted.
pub trait GraphExecutor: Send + Sync {
    fn execute(&self, ctx: ExecutionContext) -> ExecutionFuture;
}

/// Live accumulator counters shared between an executor and readers.
#[derive(Debug, Clone, Default)]
pub struct AccumulatorSink {
    inner: Arc<Mutex<Accumulators>>,
}

impl AccumulatorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `value` into the accumulator `name`.
    pub fn add(&self, name: &str, value: Accumulator) {
        let mut acc = self.lock();
        let merged = match acc.get(name) {
            Some(current) => current.merge(value),
            None => value,
        };
        acc.insert(name.to_string(), merged);
    }

    /// Overwrite the accumulator `name`.
    pub fn set(&self, name: &str, value: Accumulator) {
        self.lock().insert(name.to_string(), value);
    }

    pub fn snapshot(&self) -> Accumulators {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Accumulators> {
        // Counters stay usable even if an executor panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Acknowledges every graph and finishes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl GraphExecutor for NoopExecutor {
    fn execute(&self, ctx: ExecutionContext) -> ExecutionFuture {
        Box::pin(async move {
            ctx.accumulators
                .set("resources.deployed", Accumulator::Long(ctx.resources.len() as i64));
            ctx.accumulators
                .set("graph.bytes", Accumulator::Long(ctx.graph.encoded_len() as i64));
            tracing::debug!(job = %ctx.job, "noop executor acknowledged graph");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_merges_values() {
        let sink = AccumulatorSink::new();
        sink.add("items", Accumulator::Long(2));
        sink.add("items", Accumulator::Long(3));
        sink.set("ratio", Accumulator::Double(0.5));

        let snap = sink.snapshot();
        assert_eq!(snap["items"], Accumulator::Long(5));
        assert_eq!(snap["ratio"], Accumulator::Double(0.5));
    }

    #[tokio::test]
    async fn noop_records_counters() {
        let sink = AccumulatorSink::new();
        let ctx = ExecutionContext {
            job: "j".to_string(),
            config: JobConfig::default(),
            graph: Dag::new(json!({ "v": 1 })),
            resources: Vec::new(),
            accumulators: sink.clone(),
        };

        NoopExecutor.execute(ctx).await.unwrap();

        let snap = sink.snapshot();
        assert_eq!(snap["resources.deployed"], Accumulator::Long(0));
        assert!(snap["graph.bytes"].as_i64().unwrap() > 0);
    }
}
