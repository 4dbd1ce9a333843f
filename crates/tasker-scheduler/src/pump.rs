use serde::{Deserialize, Serialize};
use tasker_core::{HostConfig, Tick};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{engine::Scheduler, error::SchedulerError};

/// Totals for one pump run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpSummary {
    pub ticks: u64,
    pub executed: usize,
    pub failed: usize,
    pub last_tick: Option<Tick>,
}

/// Drives [`Scheduler::tick`] from a Tokio interval of one tick length.
///
/// Sync actions run on the pump's task, so they should stay short. Missed
/// intervals are skipped rather than replayed in a burst.
pub struct TickPump {
    scheduler: Scheduler,
    heartbeat_every: u64,
    max_ticks: Option<u64>,
}

impl TickPump {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            heartbeat_every: 0,
            max_ticks: None,
        }
    }

    pub fn from_config(scheduler: Scheduler, config: &HostConfig) -> Self {
        Self::new(scheduler)
            .heartbeat_every(config.heartbeat_every)
            .max_ticks(config.max_ticks)
    }

    /// Log scheduler stats every `n` ticks. Zero disables the heartbeat.
    pub fn heartbeat_every(mut self, n: u64) -> Self {
        self.heartbeat_every = n;
        self
    }

    /// Stop on its own after `n` ticks.
    pub fn max_ticks(mut self, n: Option<u64>) -> Self {
        self.max_ticks = n;
        self
    }

    /// Run until `shutdown` flips to `true`, `max_ticks` is reached, or the
    /// scheduler is drained.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> PumpSummary {
        let period = self.scheduler.tick_duration().as_duration();
        info!(tick_ms = period.as_millis() as u64, "tick pump started");

        let mut summary = PumpSummary::default();
        let mut next = self.scheduler.current_tick().saturating_add(1);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first interval tick completes immediately
        interval.tick().await;

        loop {
            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                info!(ticks = summary.ticks, "tick limit reached");
                break;
            }
            if !self.scheduler.is_running() {
                info!("scheduler drained, tick pump stopping");
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    match self.scheduler.tick(next) {
                        Ok(report) => {
                            summary.ticks += 1;
                            summary.executed += report.executed;
                            summary.failed += report.failed;
                            summary.last_tick = Some(next);
                            next = next.saturating_add(1);
                        }
                        Err(SchedulerError::NonMonotonicTick { last, .. }) => {
                            warn!(tick = next, last, "clock advanced elsewhere, resyncing");
                            next = last.saturating_add(1);
                        }
                        Err(e) => error!(tick = next, "scheduler tick error: {e}"),
                    }
                    self.heartbeat(summary.ticks);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tick pump shutting down");
                        break;
                    }
                }
            }
        }
        summary
    }

    fn heartbeat(&self, ticks: u64) {
        if self.heartbeat_every == 0 || ticks == 0 || ticks % self.heartbeat_every != 0 {
            return;
        }
        let stats = self.scheduler.stats();
        info!(
            tick = stats.current_tick,
            live = stats.live_tasks,
            pending_sync = stats.pending_sync,
            in_flight = stats.in_flight,
            "scheduler heartbeat"
        );
    }
}
