//! Mock timer for testing
//!
//! Virtual monotonic clock. Delays advance the clock instead of sleeping,
//! so timeout paths run instantly and deterministically. Several handles
//! may share one clock; a two-board test gives each engine its own handle
//! and both observe the same timeline.

use core::cell::Cell;

use crate::platform::{Result, traits::TimerInterface};

/// Shared virtual clock, microsecond resolution
pub struct MockClock {
    now_us: Cell<u64>,
}

impl MockClock {
    pub const fn new() -> Self {
        Self {
            now_us: Cell::new(0),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }

    /// Current virtual time
    pub fn now_us(&self) -> u64 {
        self.now_us.get()
    }

    /// A `TimerInterface` view onto this clock
    pub fn handle(&self) -> MockClockHandle<'_> {
        MockClockHandle { clock: self }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One engine's handle on a shared `MockClock`
pub struct MockClockHandle<'c> {
    clock: &'c MockClock,
}

impl TimerInterface for MockClockHandle<'_> {
    fn delay_us(&mut self, us: u32) -> Result<()> {
        self.clock.advance(u64::from(us));
        Ok(())
    }

    fn now_us(&self) -> u64 {
        self.clock.now_us()
    }
}
