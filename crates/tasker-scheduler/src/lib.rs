//! `tasker-scheduler`: tick-driven task scheduler for a host with a
//! discrete clock.
//!
//! # Overview
//!
//! The host advances a monotonic tick counter by calling
//! [`Scheduler::tick`]. Sync tasks live in a due-time index and run inside
//! that call, on the caller's thread, ordered by due tick and then by
//! [`TaskId`]. Async tasks are timed by a host [`DelayTimer`] and run on a
//! bounded host [`AsyncExecutor`]; [`TokioRuntime`] provides both on Tokio.
//!
//! # Task kinds
//!
//! | Context | Period | Runs                                              |
//! |---------|--------|---------------------------------------------------|
//! | `Sync`  | none   | Once, at the first tick ≥ `current + delay`       |
//! | `Sync`  | `p`    | Then every `p` ticks after each run, no catch-up  |
//! | `Async` | none   | Once on the pool after `delay` ticks of wall time |
//! | `Async` | `p`    | Re-armed `p` ticks after each completed run       |
//!
//! A failing action (error or panic) is reported to the [`ErrorSink`] and
//! its task is cancelled. [`Scheduler::submit`] wraps a one-shot task whose
//! value is handed back to the caller.

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handle;
pub mod index;
pub mod pump;
pub mod runtime;
pub mod sink;
pub mod submit;
pub mod task;

pub use dispatch::{AsyncDispatcher, AsyncExecutor, DelayTimer, Job};
pub use engine::{Scheduler, SchedulerBuilder, SchedulerStats, TickReport};
pub use error::{Result, SchedulerError, TaskFailure};
pub use handle::TaskHandle;
pub use pump::{PumpSummary, TickPump};
pub use runtime::TokioRuntime;
pub use sink::{ErrorSink, TracingErrorSink};
pub use submit::Submission;
pub use task::{Action, ExecutionContext, OwnerId, TaskId, TaskInfo, TaskSpec, TaskState};
pub use tasker_core::{Tick, TickDuration};
