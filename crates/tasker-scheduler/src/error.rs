use thiserror::Error;

use crate::task::TaskId;
use tasker_core::Tick;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Bad delay/period at schedule time. No task was created.
    #[error("Invalid schedule parameters: {0}")]
    InvalidScheduleParameters(String),

    /// The host reported a tick that does not move the clock forward.
    #[error("Non-monotonic tick: got {tick}, last observed {last}")]
    NonMonotonicTick { tick: Tick, last: Tick },

    /// `tick` was called while another `tick` was still running its batch.
    #[error("Tick {tick} rejected: another tick is still executing")]
    TickInProgress { tick: Tick },

    /// The scheduler has been drained and accepts no new work.
    #[error("Scheduler stopped")]
    SchedulerStopped,

    /// An action failed. Only ever delivered to the error sink.
    #[error("Task {task} failed: {cause}")]
    TaskExecutionFailure {
        task: TaskId,
        #[source]
        cause: TaskFailure,
    },
}

impl SchedulerError {
    /// Short error code string for host-side reporting.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidScheduleParameters(_) => "INVALID_SCHEDULE_PARAMETERS",
            SchedulerError::NonMonotonicTick { .. } => "NON_MONOTONIC_TICK",
            SchedulerError::TickInProgress { .. } => "TICK_IN_PROGRESS",
            SchedulerError::SchedulerStopped => "SCHEDULER_STOPPED",
            SchedulerError::TaskExecutionFailure { .. } => "TASK_EXECUTION_FAILURE",
        }
    }
}

/// How an action failed.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The action returned `Err`.
    #[error("action returned an error: {0:#}")]
    Returned(anyhow::Error),

    /// The action panicked; the payload is rendered to a string.
    #[error("action panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
