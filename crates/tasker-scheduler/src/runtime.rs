//! Tokio-backed execution capability and timer for hosts that already run a
//! Tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::dispatch::{AsyncExecutor, DelayTimer, Job};

/// Runs jobs on Tokio's blocking pool, at most `concurrency` at a time.
///
/// Actions are plain closures that may block, so they go through
/// `spawn_blocking` rather than onto the async worker threads.
#[derive(Clone)]
pub struct TokioRuntime {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl TokioRuntime {
    /// Bind to an explicit runtime handle. `concurrency` is clamped to
    /// `1..=Semaphore::MAX_PERMITS`.
    pub fn new(handle: Handle, concurrency: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS))),
        }
    }

    /// Bind to the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `Handle::current`.
    pub fn current(concurrency: usize) -> Self {
        Self::new(Handle::current(), concurrency)
    }
}

impl AsyncExecutor for TokioRuntime {
    fn execute(&self, job: Job) {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("async executor closed, job dropped");
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!("async job did not finish cleanly: {e}");
            }
        });
    }
}

impl DelayTimer for TokioRuntime {
    fn schedule(&self, delay: Duration, job: Job) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn oversized_concurrency_is_clamped() {
        let rt = runtime();
        let exec = TokioRuntime::new(rt.handle().clone(), usize::MAX);
        assert_eq!(exec.permits.available_permits(), Semaphore::MAX_PERMITS);

        let (tx, rx) = mpsc::channel();
        exec.execute(Box::new(move || tx.send(7).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn zero_concurrency_still_runs_jobs() {
        let rt = runtime();
        let exec = TokioRuntime::new(rt.handle().clone(), 0);
        assert_eq!(exec.permits.available_permits(), 1);

        let (tx, rx) = mpsc::channel();
        exec.schedule(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
