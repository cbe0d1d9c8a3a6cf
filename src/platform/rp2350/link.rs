//! RP2350 link port implementation
//!
//! This module provides the inter-board byte port for RP2350 using the
//! `rp235x-hal` SPI peripheral. The exchange protocol polls the FIFO flags
//! and moves one byte at a time, so the port exposes the raw non-blocking
//! register interface rather than a whole-buffer transfer.

use crate::platform::{
    Result,
    error::{BusError, PlatformError},
    traits::LinkPortInterface,
};
use embedded_hal_nb::nb;
use rp235x_hal::spi::Spi;

/// RP2350 link port implementation
///
/// Wraps the `rp235x-hal` SPI peripheral to implement the
/// `LinkPortInterface` trait.
///
/// # Note
///
/// Bus role (controller or peripheral) and clocking are fixed during
/// peripheral initialization. The indicator lines are plain GPIO and are
/// managed separately.
pub struct Rp2350LinkPort<D, P>
where
    D: rp235x_hal::spi::SpiDevice,
    P: rp235x_hal::spi::ValidSpiPinout<D>,
{
    spi: Spi<rp235x_hal::spi::Enabled, D, P, 8>,
}

impl<D, P> Rp2350LinkPort<D, P>
where
    D: rp235x_hal::spi::SpiDevice,
    P: rp235x_hal::spi::ValidSpiPinout<D>,
{
    /// Create a new RP2350 link port instance
    ///
    /// # Arguments
    ///
    /// * `spi` - The HAL SPI peripheral, already enabled
    pub fn new(spi: Spi<rp235x_hal::spi::Enabled, D, P, 8>) -> Self {
        Self { spi }
    }
}

impl<D, P> LinkPortInterface for Rp2350LinkPort<D, P>
where
    D: rp235x_hal::spi::SpiDevice,
    P: rp235x_hal::spi::ValidSpiPinout<D>,
{
    fn tx_ready(&self) -> bool {
        self.spi.is_writable()
    }

    fn rx_ready(&self) -> bool {
        self.spi.is_readable()
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        use embedded_hal_nb::spi::FullDuplex;
        match self.spi.write(byte) {
            Ok(()) => Ok(()),
            Err(nb::Error::WouldBlock) => Err(PlatformError::Bus(BusError::TxNotReady)),
            Err(nb::Error::Other(_)) => Err(PlatformError::Bus(BusError::TransferFailed)),
        }
    }

    fn recv(&mut self) -> Result<u8> {
        use embedded_hal_nb::spi::FullDuplex;
        match self.spi.read() {
            Ok(byte) => Ok(byte),
            Err(nb::Error::WouldBlock) => Err(PlatformError::Bus(BusError::RxEmpty)),
            Err(nb::Error::Other(_)) => Err(PlatformError::Bus(BusError::TransferFailed)),
        }
    }
}
