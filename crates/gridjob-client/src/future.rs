//! Completion handles returned by asynchronous job operations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use gridjob_core::JobResult;

/// A pending job operation.
///
/// The operation runs on the job's worker pool whether or not this handle
/// is polled; awaiting it only observes the result.
#[must_use = "a JobFuture reports the operation's result only when awaited"]
pub struct JobFuture<T> {
    inner: Pin<Box<dyn Future<Output = JobResult<T>> + Send>>,
}

impl<T> JobFuture<T> {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = JobResult<T>> + Send + 'static,
    {
        Self {
            inner: Box::pin(future),
        }
    }

    /// A handle that is already resolved.
    pub fn ready(result: JobResult<T>) -> Self
    where
        T: Send + 'static,
    {
        Self::new(std::future::ready(result))
    }
}

impl<T> Future for JobFuture<T> {
    type Output = JobResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for JobFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFuture").finish_non_exhaustive()
    }
}
