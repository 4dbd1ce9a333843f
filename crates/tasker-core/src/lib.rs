//! `tasker-core`: configuration and tick/time primitives shared by the
//! scheduler engine and its hosts.

pub mod config;
pub mod error;
pub mod time;

pub use config::{HostConfig, SchedulerConfig, TaskerConfig};
pub use error::{CoreError, Result};
pub use time::{Tick, TickDuration};
