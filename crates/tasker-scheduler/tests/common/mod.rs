// Test doubles for the host capabilities.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasker_scheduler::{
    AsyncExecutor, DelayTimer, Job, Scheduler, SchedulerError, TaskHandle, TaskId, TickDuration,
};

/// Runs every job on the calling thread.
pub struct InlineExecutor;

impl AsyncExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        job()
    }
}

/// One OS thread per job.
pub struct ThreadExecutor;

impl AsyncExecutor for ThreadExecutor {
    fn execute(&self, job: Job) {
        std::thread::spawn(job);
    }
}

/// Holds delayed jobs until the test fires them.
#[derive(Default)]
pub struct ManualTimer {
    pending: Mutex<Vec<(Duration, Job)>>,
}

impl DelayTimer for ManualTimer {
    fn schedule(&self, delay: Duration, job: Job) {
        self.pending.lock().unwrap().push((delay, job));
    }
}

impl ManualTimer {
    /// Fire every job armed so far. Jobs armed while firing wait for the
    /// next call.
    pub fn fire_all(&self) -> usize {
        let jobs = std::mem::take(&mut *self.pending.lock().unwrap());
        let n = jobs.len();
        for (_, job) in jobs {
            job();
        }
        n
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.pending.lock().unwrap().iter().map(|(d, _)| *d).collect()
    }

    pub fn armed(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// (task, error code, rendered message) for every reported failure.
pub type Failures = Arc<Mutex<Vec<(TaskId, &'static str, String)>>>;

pub struct Harness {
    pub scheduler: Scheduler,
    pub timer: Arc<ManualTimer>,
    pub failures: Failures,
}

/// Scheduler with an inline executor, a manual timer, 50 ms ticks and a
/// recording error sink.
pub fn harness() -> Harness {
    harness_with(Arc::new(InlineExecutor))
}

pub fn harness_with(executor: Arc<dyn AsyncExecutor>) -> Harness {
    let timer = Arc::new(ManualTimer::default());
    let failures: Failures = Arc::default();
    let sink = Arc::clone(&failures);
    let scheduler = Scheduler::builder(executor, timer.clone())
        .tick_duration(TickDuration::from_millis(50))
        .error_sink(move |task: &TaskHandle, err: &SchedulerError| {
            sink.lock()
                .unwrap()
                .push((task.id(), err.code(), err.to_string()));
        })
        .build();
    Harness {
        scheduler,
        timer,
        failures,
    }
}

/// Shared event log for ordering assertions.
pub type Log = Arc<Mutex<Vec<&'static str>>>;

pub fn push(log: &Log, entry: &'static str) -> impl FnMut(&TaskHandle) -> anyhow::Result<()> {
    let log = Arc::clone(log);
    move |_| {
        log.lock().unwrap().push(entry);
        Ok(())
    }
}
