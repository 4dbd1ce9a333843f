use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tasker_core::{Tick, TickDuration};

use crate::error::{Result, SchedulerError};
use crate::handle::TaskHandle;

/// The work a task performs. It receives its own handle so a repeating task
/// can cancel itself from inside.
pub type Action = Box<dyn FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static>;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Scheduler-assigned task identifier. Monotonic, never reused, and the
/// tie-break between tasks due on the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OwnerId
// ---------------------------------------------------------------------------

/// Identifier of the plugin/module that registered a task, used for bulk
/// cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Where a task runs. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// On the host's tick thread, inside `Scheduler::tick`.
    Sync,
    /// On the host-supplied worker pool, timed by the host timer.
    Async,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionContext::Sync => "sync",
            ExecutionContext::Async => "async",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskState {
    /// Waiting for its due tick (sync) or its dispatch (async).
    Scheduled = 0,
    /// The action is executing right now.
    Running = 1,
    /// One-shot task that ran successfully.
    Completed = 2,
    /// Cancelled by a caller, by owner/bulk cancellation, or after a failure.
    Cancelled = 3,
}

impl TaskState {
    /// True once the task can never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Scheduled,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            _ => TaskState::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Scheduled => "scheduled",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TaskState::Scheduled),
            "running" => Ok(TaskState::Running),
            "completed" => Ok(TaskState::Completed),
            "cancelled" => Ok(TaskState::Cancelled),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// State shared between the registry record and every handle clone.
///
/// Written only while the scheduler lock is held; read lock-free by handles.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// Everything about a task except its action.
///
/// ```
/// use tasker_scheduler::TaskSpec;
///
/// let spec = TaskSpec::sync().delay(3).every(20).owned_by("regen");
/// assert_eq!(spec.period, Some(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub context: ExecutionContext,
    /// Ticks before the first run (sync) or first dispatch (async).
    pub initial_delay: Tick,
    /// `None` for one-shot tasks; must be > 0 when set.
    pub period: Option<Tick>,
    pub owner: Option<OwnerId>,
}

impl TaskSpec {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            initial_delay: 0,
            period: None,
            owner: None,
        }
    }

    /// Tick-thread task.
    pub fn sync() -> Self {
        Self::new(ExecutionContext::Sync)
    }

    /// Worker-pool task.
    pub fn background() -> Self {
        Self::new(ExecutionContext::Async)
    }

    pub fn delay(mut self, ticks: Tick) -> Self {
        self.initial_delay = ticks;
        self
    }

    pub fn every(mut self, ticks: Tick) -> Self {
        self.period = Some(ticks);
        self
    }

    pub fn owned_by(mut self, owner: impl Into<OwnerId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Like [`TaskSpec::delay`], rounding `duration` down to whole ticks.
    pub fn delay_for(self, duration: Duration, tick: &TickDuration) -> Self {
        self.delay(tick.to_ticks(duration))
    }

    /// Like [`TaskSpec::every`]. A duration shorter than one tick yields a
    /// zero period, which `schedule` rejects.
    pub fn every_for(self, duration: Duration, tick: &TickDuration) -> Self {
        self.every(tick.to_ticks(duration))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.period == Some(0) {
            return Err(SchedulerError::InvalidScheduleParameters(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskRecord / TaskInfo
// ---------------------------------------------------------------------------

/// Registry entry owned by the scheduler.
pub(crate) struct TaskRecord {
    pub(crate) handle: TaskHandle,
    pub(crate) period: Option<Tick>,
    /// Taken out while the action runs, so a record without an action is
    /// currently executing.
    pub(crate) action: Option<Action>,
    pub(crate) runs: u64,
}

impl TaskRecord {
    pub(crate) fn state(&self) -> TaskState {
        self.handle.state()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.handle.cell().set(state);
    }

    /// `next_due` comes from the due-time index; `None` for async tasks.
    pub(crate) fn info(&self, next_due: Option<Tick>) -> TaskInfo {
        TaskInfo {
            id: self.handle.id(),
            owner: self.handle.owner().cloned(),
            context: self.handle.context(),
            state: self.state(),
            period: self.period,
            next_due,
            runs: self.runs,
        }
    }
}

/// Point-in-time description of a live task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub owner: Option<OwnerId>,
    pub context: ExecutionContext,
    pub state: TaskState,
    pub period: Option<Tick>,
    pub next_due: Option<Tick>,
    /// Completed executions so far.
    pub runs: u64,
}

pub(crate) fn new_state_cell() -> Arc<StateCell> {
    Arc::new(StateCell::new(TaskState::Scheduled))
}
