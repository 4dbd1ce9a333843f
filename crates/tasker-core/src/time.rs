//! Tick numbers and tick ↔ wall-clock conversion.
//!
//! The scheduler itself only ever counts ticks. Durations show up at the
//! edges: the async path needs a real delay for its timer, and callers often
//! want to say "in 3 seconds" instead of "in 60 ticks".

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TICK_MILLIS;

/// Host loop iteration counter.
pub type Tick = u64;

/// Wall-clock length of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDuration {
    millis: u64,
}

impl TickDuration {
    /// A zero length is bumped to 1 ms so conversions never divide by zero.
    pub fn from_millis(millis: u64) -> Self {
        Self {
            millis: millis.max(1),
        }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    /// Whole ticks covered by `duration`, rounded down.
    pub fn to_ticks(&self, duration: Duration) -> Tick {
        let ticks = duration.as_millis() / u128::from(self.millis);
        Tick::try_from(ticks).unwrap_or(Tick::MAX)
    }

    pub fn to_duration(&self, ticks: Tick) -> Duration {
        Duration::from_millis(ticks.saturating_mul(self.millis))
    }
}

impl Default for TickDuration {
    fn default() -> Self {
        Self::from_millis(DEFAULT_TICK_MILLIS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_twenty_ticks_per_second() {
        let td = TickDuration::default();
        assert_eq!(td.to_ticks(Duration::from_secs(1)), 20);
        assert_eq!(td.to_duration(20), Duration::from_secs(1));
    }

    #[test]
    fn partial_ticks_round_down() {
        let td = TickDuration::default();
        assert_eq!(td.to_ticks(Duration::from_millis(49)), 0);
        assert_eq!(td.to_ticks(Duration::from_millis(99)), 1);
    }

    #[test]
    fn zero_length_is_clamped() {
        let td = TickDuration::from_millis(0);
        assert_eq!(td.millis(), 1);
        assert_eq!(td.to_ticks(Duration::from_millis(7)), 7);
    }

    #[test]
    fn huge_tick_counts_saturate() {
        let td = TickDuration::default();
        assert_eq!(td.to_duration(Tick::MAX), Duration::from_millis(u64::MAX));
    }
}
