//! Platform abstraction layer
//!
//! This module provides hardware abstraction for the link peripherals used by
//! the inter-board exchange: the indicator GPIO pair, the byte-register link
//! port, and a monotonic timer. All platform-specific code lives here.

pub mod error;
pub mod traits;

// Platform implementations (feature-gated)
#[cfg(feature = "rp2350")]
pub mod rp2350;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::{PlatformError, Result};
pub use traits::{
    GpioIndicator, GpioInterface, GpioMode, IndicatorInterface, LinkPortInterface, TimerInterface,
};
