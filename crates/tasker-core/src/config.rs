use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::time::TickDuration;

pub const DEFAULT_TICK_MILLIS: u64 = 50; // 20 ticks per second
pub const DEFAULT_ASYNC_CONCURRENCY: usize = 4;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HEARTBEAT_EVERY: u64 = 100; // ticks between heartbeat lines
pub const DEFAULT_LOG_FILTER: &str = "tasker_host=info,tasker_scheduler=info";

/// Top-level config (tasker.toml + TASKER_* env overrides).
///
/// Env keys use `__` between section and field, e.g.
/// `TASKER_SCHEDULER__TICK_MILLIS=25`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock length of one tick. Only the async path and the tick pump
    /// look at this; sync scheduling is purely tick-based.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Max number of async actions executing at the same time.
    #[serde(default = "default_async_concurrency")]
    pub async_concurrency: usize,
    /// How long shutdown waits for in-flight async actions.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Tick the clock reads before the host reports its first tick.
    #[serde(default)]
    pub start_tick: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: DEFAULT_TICK_MILLIS,
            async_concurrency: DEFAULT_ASYNC_CONCURRENCY,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            start_tick: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_duration(&self) -> TickDuration {
        TickDuration::from_millis(self.tick_millis)
    }

    pub fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Settings for the reference host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Fallback tracing filter when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Stop the pump after this many ticks. `None` runs until Ctrl-C.
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// Ticks between heartbeat lines; 0 turns the heartbeat off.
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            max_ticks: None,
            heartbeat_every: DEFAULT_HEARTBEAT_EVERY,
        }
    }
}

fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}
fn default_async_concurrency() -> usize {
    DEFAULT_ASYNC_CONCURRENCY
}
fn default_drain_timeout_secs() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_SECS
}
fn default_heartbeat_every() -> u64 {
    DEFAULT_HEARTBEAT_EVERY
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl TaskerConfig {
    /// Load config from a TOML file with TASKER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.tasker/tasker.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TaskerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TASKER_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CoreError;

        if self.scheduler.tick_millis == 0 {
            return Err(CoreError::Config("scheduler.tick_millis must be > 0".into()));
        }
        if self.scheduler.async_concurrency == 0 {
            return Err(CoreError::Config(
                "scheduler.async_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tasker/tasker.toml", home)
}
