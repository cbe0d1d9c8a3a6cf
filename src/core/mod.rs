//! Core utilities shared across the firmware
//!
//! Holds concerns that are not tied to a specific board or peripheral,
//! currently the logging abstraction.

pub mod logging;
