use tracing::error;

use crate::error::SchedulerError;
use crate::handle::TaskHandle;

/// Receives every action failure. Called outside the scheduler lock, on the
/// thread that ran the action, so it may schedule or cancel freely.
pub trait ErrorSink: Send + Sync {
    fn report(&self, task: &TaskHandle, error: &SchedulerError);
}

impl<F> ErrorSink for F
where
    F: Fn(&TaskHandle, &SchedulerError) + Send + Sync,
{
    fn report(&self, task: &TaskHandle, error: &SchedulerError) {
        self(task, error)
    }
}

/// Fallback sink used when the host installs none: one `error!` line per
/// failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, task: &TaskHandle, error: &SchedulerError) {
        error!(
            task_id = %task.id(),
            owner = task.owner().map(|o| o.as_str()).unwrap_or("-"),
            context = %task.context(),
            code = error.code(),
            "scheduled task failed: {error}"
        );
    }
}
