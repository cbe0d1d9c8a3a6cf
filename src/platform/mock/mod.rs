//! Mock platform implementation for testing
//!
//! This module provides mock implementations of platform traits that can be
//! used for unit testing without requiring actual hardware. The centerpiece
//! is `MockWire`: an in-memory duplex byte channel plus a shared pair of
//! atomic indicator flags, so two exchange tasks can be driven against each
//! other in lockstep on the host.
//!
//! # Feature Gate
//!
//! This module is available in two contexts:
//! - During test builds (`#[cfg(test)]`)
//! - When the `mock` feature is enabled

#![cfg(any(test, feature = "mock"))]

mod gpio;
mod link;
mod timer;

pub use gpio::MockGpio;
pub use link::{MockIndicator, MockLinkPort, MockWire, WireSide};
pub use timer::{MockClock, MockClockHandle};
