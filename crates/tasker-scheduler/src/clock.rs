use tasker_core::Tick;

use crate::error::{Result, SchedulerError};

/// Host-fed tick counter. Never advances on its own.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Tick,
    last: Option<Tick>,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Clock that reads `origin` until the host reports its first tick.
    pub fn starting_at(origin: Tick) -> Self {
        Self { origin, last: None }
    }

    /// Current tick: the last observed one, or the origin before any.
    pub fn now(&self) -> Tick {
        self.last.unwrap_or(self.origin)
    }

    /// Check that `tick` moves the clock forward without recording it.
    pub fn check(&self, tick: Tick) -> Result<()> {
        match self.last {
            Some(last) if tick <= last => Err(SchedulerError::NonMonotonicTick { tick, last }),
            None if tick < self.origin => Err(SchedulerError::NonMonotonicTick {
                tick,
                last: self.origin,
            }),
            _ => Ok(()),
        }
    }

    /// Record `tick`. Rejected ticks leave the clock untouched.
    pub fn observe(&mut self, tick: Tick) -> Result<()> {
        self.check(tick)?;
        self.last = Some(tick);
        Ok(())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_origin_until_first_tick() {
        let mut clock = Clock::starting_at(10);
        assert_eq!(clock.now(), 10);
        // the origin itself counts as a forward step
        clock.observe(10).unwrap();
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn rejects_repeat_and_backwards_ticks() {
        let mut clock = Clock::new();
        clock.observe(5).unwrap();
        assert!(matches!(
            clock.observe(5),
            Err(SchedulerError::NonMonotonicTick { tick: 5, last: 5 })
        ));
        assert!(clock.observe(3).is_err());
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn first_tick_cannot_precede_origin() {
        let mut clock = Clock::starting_at(10);
        assert!(clock.observe(9).is_err());
        assert_eq!(clock.now(), 10);
        assert!(clock.observe(10).is_ok());
    }

    #[test]
    fn jumps_are_allowed() {
        let mut clock = Clock::new();
        clock.observe(1).unwrap();
        clock.observe(1_000).unwrap();
        assert_eq!(clock.now(), 1_000);
    }
}
