#![cfg_attr(not(test), no_std)]

//! hydrospec - Inter-board messaging for a two-board profiling spectrometer
//!
//! This library provides the addressed-packet model, per-node router,
//! shared-buffer pool, and SPI link handshake/framing protocol that connect
//! the instrument's Controller and Spectrometer boards.

// Platform abstraction layer (GPIO indicator lines, link port, timer)
pub mod platform;

// Core systems (logging)
pub mod core;

// Inter-board communication (packet model, router, buffer pool, exchange task)
pub mod communication;

#[cfg(feature = "rp2350")]
use defmt_rtt as _;
#[cfg(feature = "rp2350")]
use panic_probe as _;
