//! `VfsRuntime`: where `AsyncFileChannel` submits its blocking work.
//!
//! Shaped after the submit-a-job/await-a-oneshot pattern the workspace's own
//! compile-job pool uses to turn a unit of background work into a future:
//! the caller hands over a closure, gets back a future, and the
//! implementation decides how "later" actually happens.

use std::future::Future;
use std::pin::Pin;

/// Where an `AsyncFileChannel` operation actually runs. Implementations
/// decide the scheduling: inline for tests, a real thread pool or Tokio's
/// blocking pool in production. Callers must not assume ordering across
/// distinct `spawn_blocking` calls — only `AsyncFileChannel`'s own
/// per-channel FIFO queue guarantees that.
pub trait VfsRuntime: Send + Sync + 'static {
    fn spawn_blocking<F, T>(&self, task: F) -> Pin<Box<dyn Future<Output = T> + Send>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;
}

/// Runs every task synchronously, on the calling thread, before
/// `spawn_blocking` returns. No real concurrency: for unit/integration tests
/// and for embedding in a host with no executor of its own to offer.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTestRuntime;

impl VfsRuntime for InlineTestRuntime {
    fn spawn_blocking<F, T>(&self, task: F) -> Pin<Box<dyn Future<Output = T> + Send>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let result = task();
        Box::pin(async move { result })
    }
}

/// Dispatches onto Tokio's blocking thread pool. A Tokio runtime must
/// already be entered wherever the returned future is polled.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRuntime;

#[cfg(feature = "tokio")]
impl VfsRuntime for TokioRuntime {
    fn spawn_blocking<F, T>(&self, task: F) -> Pin<Box<dyn Future<Output = T> + Send>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        use futures::FutureExt;

        let (tx, rx) = futures::channel::oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(task());
        });
        Box::pin(rx.map(|r| r.expect("spawn_blocking task panicked or was dropped")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_runtime_runs_before_returning_and_resolves_immediately() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = ran.clone();
        let future = InlineTestRuntime.spawn_blocking(move || {
            ran2.store(true, std::sync::atomic::Ordering::SeqCst);
            42
        });
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(futures::executor::block_on(future), 42);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn tokio_runtime_runs_on_the_blocking_pool() {
        let result = TokioRuntime.spawn_blocking(|| 7).await;
        assert_eq!(result, 7);
    }
}
