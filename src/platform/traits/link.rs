//! Inter-board link interface traits
//!
//! This module defines the two hardware capabilities the exchange protocol
//! is built on: a byte-register link port and the indicator line pair.
//!
//! The link port deliberately exposes register-level semantics (ready poll +
//! single byte moves) instead of a stream interface: the bus has no
//! interrupt-driven readiness signal available to the slave role, so the
//! protocol layer polls readiness itself with bounded budgets.

use super::gpio::GpioInterface;
use crate::platform::Result;

/// Byte-register link port
///
/// One instance per board, wrapping the shared serial bus. All transfers are
/// single bytes; callers must poll the matching ready condition first.
///
/// # Safety Invariants
///
/// - Only one owner per port instance (the board's exchange task)
/// - `send` is only valid after `tx_ready` returned `true`
/// - `recv` is only valid after `rx_ready` returned `true`
pub trait LinkPortInterface {
    /// Check whether the transmit register can accept a byte
    fn tx_ready(&self) -> bool;

    /// Check whether the receive register holds a byte
    fn rx_ready(&self) -> bool;

    /// Write one byte into the transmit register
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Bus(BusError::TxNotReady)` if the register
    /// cannot accept a byte.
    fn send(&mut self, byte: u8) -> Result<()>;

    /// Read one byte from the receive register
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Bus(BusError::RxEmpty)` if no byte is
    /// available.
    fn recv(&mut self) -> Result<u8>;
}

/// Indicator line pair
///
/// Each board drives one output line (its own indicator) and reads the
/// peer's output on an input line. The lines are the link's mutual-exclusion
/// primitive: a board asserts Active only while attempting a transfer and
/// returns to Passive on every exit path.
pub trait IndicatorInterface {
    /// Assert this board's indicator (intent to use the link)
    fn set_active(&mut self) -> Result<()>;

    /// Release this board's indicator
    fn set_passive(&mut self) -> Result<()>;

    /// Read the peer board's indicator
    fn peer_active(&self) -> bool;
}

/// Indicator pair over two GPIO pins
///
/// Adapts any output/input `GpioInterface` pair to the indicator contract.
/// Active is the asserted (high) level on the output pin.
pub struct GpioIndicator<O: GpioInterface, I: GpioInterface> {
    own: O,
    peer: I,
}

impl<O: GpioInterface, I: GpioInterface> GpioIndicator<O, I> {
    /// Create an indicator pair and drive the output to Passive
    ///
    /// # Errors
    ///
    /// Returns a GPIO error if the output pin cannot be driven low.
    pub fn new(mut own: O, peer: I) -> Result<Self> {
        own.set_low()?;
        Ok(Self { own, peer })
    }
}

impl<O: GpioInterface, I: GpioInterface> IndicatorInterface for GpioIndicator<O, I> {
    fn set_active(&mut self) -> Result<()> {
        self.own.set_high()
    }

    fn set_passive(&mut self) -> Result<()> {
        self.own.set_low()
    }

    fn peer_active(&self) -> bool {
        self.peer.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockGpio;
    use crate::platform::traits::GpioMode;

    #[test]
    fn test_gpio_indicator_starts_passive() {
        let mut own = MockGpio::new(GpioMode::OutputPushPull);
        own.set_high().unwrap();
        let peer = MockGpio::new(GpioMode::InputPullDown);

        let indicator = GpioIndicator::new(own, peer).unwrap();
        assert!(!indicator.peer_active());
    }

    #[test]
    fn test_gpio_indicator_tracks_peer_input() {
        let own = MockGpio::new(GpioMode::OutputPushPull);
        let mut peer = MockGpio::new(GpioMode::InputPullDown);
        peer.set_input_state(true);

        let mut indicator = GpioIndicator::new(own, peer).unwrap();
        assert!(indicator.peer_active());

        indicator.set_active().unwrap();
        indicator.set_passive().unwrap();
        assert!(indicator.peer_active());
    }
}
