//! Timer interface trait
//!
//! Monotonic time source and busy-wait delays. The exchange protocol derives
//! all of its timeout budgets from `now_us`, so implementations must be
//! monotonic; on the host the mock clock is advanced manually, which makes
//! the protocol's timeout behavior deterministic in tests.

use crate::platform::Result;

/// Timer interface trait
pub trait TimerInterface {
    /// Busy-wait for the given number of microseconds
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Timer` if the delay cannot be performed.
    fn delay_us(&mut self, us: u32) -> Result<()>;

    /// Busy-wait for the given number of milliseconds
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Timer` if the delay cannot be performed.
    fn delay_ms(&mut self, ms: u32) -> Result<()> {
        self.delay_us(ms.saturating_mul(1000))
    }

    /// Current monotonic time in microseconds since an arbitrary epoch
    fn now_us(&self) -> u64;
}
