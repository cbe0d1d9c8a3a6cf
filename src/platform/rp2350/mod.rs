//! RP2350 platform implementation for the instrument boards
//!
//! This module provides concrete implementations of the platform abstraction
//! traits for the RP2350 microcontroller using the `rp235x-hal` crate.
//!
//! # Feature Gate
//!
//! This module is only available when the `rp2350` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! hydrospec = { version = "0.1", features = ["rp2350"] }
//! ```

mod gpio;
mod link;
mod timer;

pub use gpio::Rp2350Gpio;
pub use link::Rp2350LinkPort;
pub use timer::Rp2350Timer;
