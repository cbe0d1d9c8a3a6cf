//! Platform abstraction traits
//!
//! This module defines the traits that platform implementations must provide.

pub mod gpio;
pub mod link;
pub mod timer;

// Re-export trait interfaces
pub use gpio::{GpioInterface, GpioMode};
pub use link::{GpioIndicator, IndicatorInterface, LinkPortInterface};
pub use timer::TimerInterface;
