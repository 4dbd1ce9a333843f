//! Result-returning one-shot tasks.
//!
//! `submit` is the way to get a value back from the tick thread: the work
//! runs like any other one-shot task and its result is delivered over a
//! Tokio oneshot channel. Failures still go to the error sink as well.

use tasker_core::Tick;
use tokio::sync::oneshot;

use crate::{
    engine::Scheduler,
    error::{Result, SchedulerError},
    handle::TaskHandle,
    task::TaskSpec,
};

/// A submitted task and the channel its result arrives on.
///
/// `result` resolves to the work's value or its error. It closes without a
/// value if the task is cancelled before running or the work panics.
/// Await it from async code, or use `blocking_recv`/`try_recv` elsewhere.
#[derive(Debug)]
pub struct Submission<T> {
    pub handle: TaskHandle,
    pub result: oneshot::Receiver<anyhow::Result<T>>,
}

impl Scheduler {
    /// Run `work` once on the tick thread after `delay` ticks.
    pub fn submit<T, F>(&self, delay: Tick, work: F) -> Result<Submission<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_with(TaskSpec::sync().delay(delay), work)
    }

    /// Run `work` once on the worker pool after `delay` ticks.
    pub fn submit_async<T, F>(&self, delay: Tick, work: F) -> Result<Submission<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_with(TaskSpec::background().delay(delay), work)
    }

    /// Submit with a full spec, e.g. to attach an owner. Repeating specs are
    /// rejected: there is only one result to deliver.
    pub fn submit_with<T, F>(&self, spec: TaskSpec, work: F) -> Result<Submission<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if spec.period.is_some() {
            return Err(SchedulerError::InvalidScheduleParameters(
                "submitted tasks cannot repeat".to_string(),
            ));
        }

        let (tx, rx) = oneshot::channel();
        let mut pending = Some((work, tx));
        let handle = self.schedule(spec, move |_| {
            let Some((work, tx)) = pending.take() else {
                return Ok(());
            };
            match work() {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    Ok(())
                }
                Err(e) => {
                    // the caller gets the rendered chain, the sink the original
                    let _ = tx.send(Err(anyhow::anyhow!("{e:#}")));
                    Err(e)
                }
            }
        })?;

        Ok(Submission { handle, result: rx })
    }
}
