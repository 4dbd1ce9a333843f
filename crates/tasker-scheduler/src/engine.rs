use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tasker_core::{SchedulerConfig, Tick, TickDuration};
use tracing::{debug, info, trace};

use crate::{
    clock::Clock,
    dispatch::{AsyncDispatcher, AsyncExecutor, DelayTimer},
    error::{Result, SchedulerError, TaskFailure},
    handle::TaskHandle,
    index::DueTimeIndex,
    runtime::TokioRuntime,
    sink::{ErrorSink, TracingErrorSink},
    task::{
        new_state_cell, Action, ExecutionContext, OwnerId, TaskId, TaskInfo, TaskRecord,
        TaskSpec, TaskState,
    },
};

/// What one `tick` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    /// Actions invoked, including failed ones.
    pub executed: usize,
    pub failed: usize,
}

/// Point-in-time counters for host diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub current_tick: Tick,
    /// Live tasks of either context, including running ones.
    pub live_tasks: usize,
    /// Sync tasks waiting in the due-time index.
    pub pending_sync: usize,
    /// Async actions executing right now.
    pub in_flight: usize,
    pub next_due: Option<Tick>,
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything behind the scheduler lock.
struct Inner {
    clock: Clock,
    index: DueTimeIndex,
    tasks: HashMap<TaskId, TaskRecord>,
    owners: HashMap<OwnerId, BTreeSet<TaskId>>,
    next_id: u64,
    in_flight: usize,
    stopped: bool,
}

/// Outcome of putting a task back after its action returned.
#[derive(Default)]
struct Settled {
    /// Async period to re-arm with, once the lock is released.
    rearm: Option<Tick>,
    failure: Option<(TaskHandle, SchedulerError)>,
}

impl Inner {
    fn new(origin: Tick) -> Self {
        Self {
            clock: Clock::starting_at(origin),
            index: DueTimeIndex::with_floor(origin),
            tasks: HashMap::new(),
            owners: HashMap::new(),
            next_id: 1,
            in_flight: 0,
            stopped: false,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    fn register(&mut self, record: TaskRecord) {
        let id = record.handle.id();
        if let Some(owner) = record.handle.owner() {
            self.owners.entry(owner.clone()).or_default().insert(id);
        }
        self.tasks.insert(id, record);
    }

    /// Drop `id` from every index.
    fn forget(&mut self, id: TaskId) -> Option<TaskRecord> {
        let record = self.tasks.remove(&id)?;
        self.index.remove(id);
        if let Some(owner) = record.handle.owner() {
            if let Some(ids) = self.owners.get_mut(owner) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.owners.remove(owner);
                }
            }
        }
        Some(record)
    }

    /// Waiting tasks are removed outright; running ones are only marked and
    /// get removed by whoever is running them.
    fn cancel(&mut self, id: TaskId) -> bool {
        let Some(record) = self.tasks.get(&id) else {
            return false;
        };
        match record.state() {
            TaskState::Scheduled => {
                record.set_state(TaskState::Cancelled);
                self.forget(id);
                true
            }
            TaskState::Running => {
                record.set_state(TaskState::Cancelled);
                true
            }
            TaskState::Completed | TaskState::Cancelled => false,
        }
    }

    /// Take the action of a waiting task and mark it running.
    fn claim(&mut self, id: TaskId) -> Option<(Action, TaskHandle)> {
        let record = self.tasks.get_mut(&id)?;
        if record.state() != TaskState::Scheduled {
            return None;
        }
        let action = record.action.take()?;
        record.set_state(TaskState::Running);
        Some((action, record.handle.clone()))
    }

    /// Apply the no-catch-up rule: a repeating sync task is next due at
    /// `sync_tick + period`, never at its old due tick plus the period.
    fn settle(
        &mut self,
        id: TaskId,
        action: Action,
        result: std::result::Result<(), TaskFailure>,
        sync_tick: Option<Tick>,
    ) -> Settled {
        let mut settled = Settled::default();
        let Some(record) = self.tasks.get_mut(&id) else {
            return settled;
        };

        match result {
            Err(cause) => {
                // failing repeaters are dropped, never retried
                record.set_state(TaskState::Cancelled);
                let handle = record.handle.clone();
                self.forget(id);
                settled.failure = Some((
                    handle,
                    SchedulerError::TaskExecutionFailure { task: id, cause },
                ));
            }
            Ok(()) => {
                record.runs += 1;
                if record.state() == TaskState::Cancelled {
                    self.forget(id);
                } else if let Some(period) = record.period {
                    record.action = Some(action);
                    record.set_state(TaskState::Scheduled);
                    match sync_tick {
                        Some(now) => {
                            self.index.insert(id, now.saturating_add(period));
                        }
                        None => settled.rearm = Some(period),
                    }
                } else {
                    record.set_state(TaskState::Completed);
                    self.forget(id);
                }
            }
        }
        settled
    }

    fn live_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Signalled whenever `in_flight` drops to zero.
    idle: Condvar,
    /// Held for the whole of a `tick` call.
    ticking: Mutex<()>,
    dispatcher: AsyncDispatcher,
    sink: Arc<dyn ErrorSink>,
}

impl Shared {
    // The registry is consistent at every unlock point, and actions never
    // run under this lock, so a poisoned lock is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        let cancelled = self.lock().cancel(id);
        if cancelled {
            debug!(task_id = %id, "task cancelled");
        }
        cancelled
    }

    fn report(&self, failure: Option<(TaskHandle, SchedulerError)>) -> bool {
        match failure {
            Some((handle, error)) => {
                self.sink.report(&handle, &error);
                true
            }
            None => false,
        }
    }

    /// Hand an async run of `id` to the host after `delay` ticks.
    fn arm(self: &Arc<Self>, id: TaskId, delay: Tick) {
        let weak = Arc::downgrade(self);
        self.dispatcher.dispatch(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.run_async(id);
                }
            }),
        );
    }

    /// Body of every async job. Cancelled tasks are simply gone from the
    /// registry by the time their job runs.
    fn run_async(self: &Arc<Self>, id: TaskId) {
        let claimed = {
            let mut inner = self.lock();
            let claimed = inner.claim(id);
            if claimed.is_some() {
                inner.in_flight += 1;
            }
            claimed
        };
        let Some((mut action, handle)) = claimed else {
            trace!(task_id = %id, "async dispatch skipped, task no longer scheduled");
            return;
        };

        let result = invoke(&mut action, &handle);

        let settled = {
            let mut inner = self.lock();
            inner.in_flight -= 1;
            let settled = inner.settle(id, action, result, None);
            if inner.in_flight == 0 {
                self.idle.notify_all();
            }
            settled
        };

        self.report(settled.failure);
        if let Some(period) = settled.rearm {
            self.arm(id, period);
        }
    }
}

/// Run an action, turning both `Err` and panics into a [`TaskFailure`].
fn invoke(action: &mut Action, handle: &TaskHandle) -> std::result::Result<(), TaskFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| action(handle))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskFailure::Returned(e)),
        Err(payload) => Err(TaskFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`Scheduler`]. The async capabilities are mandatory, the
/// rest has defaults.
pub struct SchedulerBuilder {
    executor: Arc<dyn AsyncExecutor>,
    timer: Arc<dyn DelayTimer>,
    tick: TickDuration,
    start_tick: Tick,
    sink: Arc<dyn ErrorSink>,
}

impl SchedulerBuilder {
    pub fn new(executor: Arc<dyn AsyncExecutor>, timer: Arc<dyn DelayTimer>) -> Self {
        Self {
            executor,
            timer,
            tick: TickDuration::default(),
            start_tick: 0,
            sink: Arc::new(TracingErrorSink),
        }
    }

    pub fn tick_duration(mut self, tick: TickDuration) -> Self {
        self.tick = tick;
        self
    }

    /// Tick the clock reads before the host reports one.
    pub fn starting_at(mut self, tick: Tick) -> Self {
        self.start_tick = tick;
        self
    }

    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Apply tick length and start tick from config.
    pub fn config(self, config: &SchedulerConfig) -> Self {
        self.tick_duration(config.tick_duration())
            .starting_at(config.start_tick)
    }

    pub fn build(self) -> Scheduler {
        let shared = Shared {
            inner: Mutex::new(Inner::new(self.start_tick)),
            idle: Condvar::new(),
            ticking: Mutex::new(()),
            dispatcher: AsyncDispatcher::new(self.executor, self.timer, self.tick),
            sink: self.sink,
        };
        Scheduler {
            shared: Arc::new(shared),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Tick-driven task scheduler.
///
/// One instance per host process, shared by cloning (clones are handles to
/// the same scheduler). Sync tasks run inside [`Scheduler::tick`] on the
/// caller's thread; async tasks run on the host executor.
///
/// An action that captures a `Scheduler` clone keeps the scheduler alive
/// until the task is removed. Capture a [`TaskHandle`] instead where
/// possible: handles hold only a weak reference.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Start configuring a scheduler around the host's async capabilities.
    pub fn builder(
        executor: Arc<dyn AsyncExecutor>,
        timer: Arc<dyn DelayTimer>,
    ) -> SchedulerBuilder {
        SchedulerBuilder::new(executor, timer)
    }

    /// Scheduler whose async side runs on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_tokio(config: &SchedulerConfig) -> Self {
        let runtime = Arc::new(TokioRuntime::current(config.async_concurrency));
        Self::builder(runtime.clone(), runtime).config(config).build()
    }

    /// Register a task.
    ///
    /// Sync tasks are due at `current_tick + initial_delay`; a due tick that
    /// is not ahead of the current one is moved to the next advance. Async
    /// tasks are handed to the timer right away.
    pub fn schedule<F>(&self, spec: TaskSpec, action: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static,
    {
        spec.validate()?;

        let handle = {
            let mut inner = self.shared.lock();
            if inner.stopped {
                return Err(SchedulerError::SchedulerStopped);
            }
            let id = inner.allocate_id();
            let handle = TaskHandle::new(
                id,
                spec.owner.clone(),
                spec.context,
                new_state_cell(),
                Arc::downgrade(&self.shared),
            );
            let record = TaskRecord {
                handle: handle.clone(),
                period: spec.period,
                action: Some(Box::new(action)),
                runs: 0,
            };
            if spec.context == ExecutionContext::Sync {
                let due = inner.clock.now().saturating_add(spec.initial_delay);
                inner.index.insert(id, due);
            }
            inner.register(record);
            handle
        };

        debug!(
            task_id = %handle.id(),
            owner = spec.owner.as_ref().map(|o| o.as_str()).unwrap_or("-"),
            context = %spec.context,
            delay = spec.initial_delay,
            period = ?spec.period,
            "task scheduled"
        );

        if spec.context == ExecutionContext::Async {
            self.shared.arm(handle.id(), spec.initial_delay);
        }
        Ok(handle)
    }

    /// One-shot tick-thread task.
    pub fn run_later<F>(&self, delay: Tick, action: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static,
    {
        self.schedule(TaskSpec::sync().delay(delay), action)
    }

    /// Repeating tick-thread task.
    pub fn repeat<F>(&self, delay: Tick, period: Tick, action: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static,
    {
        self.schedule(TaskSpec::sync().delay(delay).every(period), action)
    }

    /// One-shot worker-pool task.
    pub fn run_async<F>(&self, delay: Tick, action: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static,
    {
        self.schedule(TaskSpec::background().delay(delay), action)
    }

    /// Repeating worker-pool task.
    pub fn repeat_async<F>(&self, delay: Tick, period: Tick, action: F) -> Result<TaskHandle>
    where
        F: FnMut(&TaskHandle) -> anyhow::Result<()> + Send + 'static,
    {
        self.schedule(TaskSpec::background().delay(delay).every(period), action)
    }

    /// Cancel through a handle. Handles from another scheduler return false.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        if !handle.belongs_to(&self.shared) {
            return false;
        }
        self.shared.cancel(handle.id())
    }

    /// Cancel every live task registered by `owner`. Returns how many were
    /// cancelled. Runs under the same lock as `schedule`, so a racing
    /// schedule for `owner` lands either fully before (and is cancelled) or
    /// fully after (and survives).
    pub fn cancel_all(&self, owner: &OwnerId) -> usize {
        let count = {
            let mut inner = self.shared.lock();
            let ids: Vec<TaskId> = inner
                .owners
                .get(owner)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            ids.into_iter().filter(|id| inner.cancel(*id)).count()
        };
        debug!(owner = %owner, count, "owner tasks cancelled");
        count
    }

    /// Cancel every sync task without stopping the scheduler.
    ///
    /// Empties the due-time index, then catches the sync tasks a concurrent
    /// `tick` has already popped or is running.
    pub fn clear(&self) -> usize {
        let count = {
            let mut inner = self.shared.lock();
            let mut ids = inner.index.drain_all();
            ids.extend(
                inner
                    .tasks
                    .values()
                    .filter(|r| r.handle.context() == ExecutionContext::Sync)
                    .map(|r| r.handle.id()),
            );
            ids.into_iter().filter(|id| inner.cancel(*id)).count()
        };
        debug!(count, "sync tasks cleared");
        count
    }

    /// Advance the clock to `tick` and run every sync task due at or before
    /// it, in due-tick then id order.
    ///
    /// Tasks scheduled while the batch runs never join it, even with zero
    /// delay. Action failures go to the error sink and never abort the batch.
    pub fn tick(&self, tick: Tick) -> Result<TickReport> {
        let _ticking = match self.shared.ticking.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(SchedulerError::TickInProgress { tick }),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };

        let batch = {
            let mut inner = self.shared.lock();
            inner.clock.observe(tick)?;
            inner.index.pop_due(tick)
        };

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        trace!(tick, due = batch.len(), "running due sync tasks");

        for (_, id) in batch {
            let Some((mut action, handle)) = self.shared.lock().claim(id) else {
                continue;
            };
            let result = invoke(&mut action, &handle);
            let settled = self.shared.lock().settle(id, action, result, Some(tick));

            report.executed += 1;
            if self.shared.report(settled.failure) {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Stop accepting work, cancel everything, and wait for running async
    /// actions to return. Idempotent.
    ///
    /// Must not be called from inside an async action: it would wait for
    /// itself.
    pub fn drain(&self) {
        self.drain_inner(None);
    }

    /// [`Scheduler::drain`] with an upper bound on the wait. Returns false if
    /// async actions were still running when `timeout` elapsed.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        self.drain_inner(Some(timeout))
    }

    fn drain_inner(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.shared.lock();
        if !inner.stopped {
            inner.stopped = true;
            let cancelled = inner
                .live_ids()
                .into_iter()
                .filter(|id| inner.cancel(*id))
                .count();
            info!(cancelled, in_flight = inner.in_flight, "scheduler draining");
        }

        let inner = match timeout {
            None => self
                .shared
                .idle
                .wait_while(inner, |i| i.in_flight > 0)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.shared
                    .idle
                    .wait_timeout_while(inner, timeout, |i| i.in_flight > 0)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        inner.in_flight == 0
    }

    /// False once `drain` has been called.
    pub fn is_running(&self) -> bool {
        !self.shared.lock().stopped
    }

    pub fn current_tick(&self) -> Tick {
        self.shared.lock().clock.now()
    }

    pub fn tick_duration(&self) -> TickDuration {
        self.shared.dispatcher.tick_duration()
    }

    /// Handle for a live task.
    pub fn handle(&self, id: TaskId) -> Option<TaskHandle> {
        self.shared.lock().tasks.get(&id).map(|r| r.handle.clone())
    }

    /// Snapshot of every live task, ordered by id.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let inner = self.shared.lock();
        inner
            .live_ids()
            .into_iter()
            .filter_map(|id| {
                inner
                    .tasks
                    .get(&id)
                    .map(|r| r.info(inner.index.due_tick(id)))
            })
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.shared.lock();
        SchedulerStats {
            current_tick: inner.clock.now(),
            live_tasks: inner.tasks.len(),
            pending_sync: inner.index.len(),
            in_flight: inner.in_flight,
            next_due: inner.index.next_due(),
            stopped: inner.stopped,
        }
    }
}
