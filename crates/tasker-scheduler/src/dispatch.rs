//! Async dispatch: the seam between the engine and the host's worker pool.
//!
//! The host supplies two capabilities: an [`AsyncExecutor`] that runs jobs on
//! a bounded pool, and a [`DelayTimer`] that runs a job after a wall-clock
//! delay. [`AsyncDispatcher`] combines them and converts tick delays to
//! durations.

use std::sync::Arc;
use std::time::Duration;

use tasker_core::{Tick, TickDuration};
use tracing::trace;

/// A unit of work handed to the host.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded-concurrency execution capability.
///
/// Jobs may run on any thread. The scheduler never calls `execute` with its
/// lock held, so running the job inline is allowed.
pub trait AsyncExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Wall-clock delay capability. Independent of the tick clock.
pub trait DelayTimer: Send + Sync {
    fn schedule(&self, delay: Duration, job: Job);
}

/// Hands async task runs to the host, after their delay.
#[derive(Clone)]
pub struct AsyncDispatcher {
    executor: Arc<dyn AsyncExecutor>,
    timer: Arc<dyn DelayTimer>,
    tick: TickDuration,
}

impl AsyncDispatcher {
    pub fn new(
        executor: Arc<dyn AsyncExecutor>,
        timer: Arc<dyn DelayTimer>,
        tick: TickDuration,
    ) -> Self {
        Self {
            executor,
            timer,
            tick,
        }
    }

    pub fn tick_duration(&self) -> TickDuration {
        self.tick
    }

    /// Run `job` on the executor once `delay` ticks' worth of wall time has
    /// passed. A zero delay goes straight to the executor.
    pub fn dispatch(&self, delay: Tick, job: Job) {
        if delay == 0 {
            self.executor.execute(job);
            return;
        }
        let wait = self.tick.to_duration(delay);
        trace!(delay_ticks = delay, wait_ms = wait.as_millis() as u64, "arming async dispatch");
        let executor = Arc::clone(&self.executor);
        self.timer
            .schedule(wait, Box::new(move || executor.execute(job)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        ran: Mutex<Vec<&'static str>>,
        delays: Mutex<Vec<Duration>>,
    }

    impl AsyncExecutor for Recorder {
        fn execute(&self, job: Job) {
            self.ran.lock().unwrap().push("exec");
            job();
        }
    }

    impl DelayTimer for Recorder {
        fn schedule(&self, delay: Duration, job: Job) {
            self.delays.lock().unwrap().push(delay);
            job();
        }
    }

    #[test]
    fn zero_delay_skips_timer() {
        let rec = Arc::new(Recorder::default());
        let d = AsyncDispatcher::new(rec.clone(), rec.clone(), TickDuration::from_millis(50));
        d.dispatch(0, Box::new(|| {}));
        assert!(rec.delays.lock().unwrap().is_empty());
        assert_eq!(rec.ran.lock().unwrap().len(), 1);
    }

    #[test]
    fn delay_is_converted_to_wall_time() {
        let rec = Arc::new(Recorder::default());
        let d = AsyncDispatcher::new(rec.clone(), rec.clone(), TickDuration::from_millis(50));
        d.dispatch(3, Box::new(|| {}));
        assert_eq!(*rec.delays.lock().unwrap(), vec![Duration::from_millis(150)]);
        // timer hands the job to the executor, not straight to the action
        assert_eq!(rec.ran.lock().unwrap().len(), 1);
    }
}
