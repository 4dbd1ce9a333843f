use std::fmt;
use std::sync::{Arc, Weak};

use crate::engine::Shared;
use crate::task::{ExecutionContext, OwnerId, StateCell, TaskId, TaskState};

/// Caller-side reference to a scheduled task.
///
/// Cheap to clone. Holds only the task id and a weak link to the scheduler,
/// so dropping every handle never cancels a task and holding one never
/// keeps a dropped scheduler alive.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    owner: Option<OwnerId>,
    context: ExecutionContext,
    state: Arc<StateCell>,
    scheduler: Weak<Shared>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        owner: Option<OwnerId>,
        context: ExecutionContext,
        state: Arc<StateCell>,
        scheduler: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            owner,
            context,
            state,
            scheduler,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Snapshot of the task state. May be stale by the time it is read.
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Completed or cancelled.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop all future executions.
    ///
    /// Returns `true` if the task was scheduled or running and is now
    /// cancelled; `false` if it had already completed or been cancelled.
    /// A running action is never interrupted, it just won't run again.
    pub fn cancel(&self) -> bool {
        match self.scheduler.upgrade() {
            Some(shared) => shared.cancel(self.id),
            None => false,
        }
    }

    pub(crate) fn cell(&self) -> &StateCell {
        &self.state
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        std::ptr::eq(self.scheduler.as_ptr(), Arc::as_ptr(shared))
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("context", &self.context)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.scheduler, &other.scheduler)
    }
}

impl Eq for TaskHandle {}
