//! Mock link wire for testing
//!
//! An in-memory duplex byte channel with the same observable semantics as
//! the hardware bus: one bounded FIFO per direction standing in for the bus
//! registers, and the two indicator lines as shared atomic flags. Two
//! protocol engines borrow opposite ends of one `MockWire` and are stepped
//! in lockstep by tests, which makes handshake conflicts, drops, and
//! timeouts reproducible without hardware.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use heapless::Deque;

use crate::platform::{
    Result,
    error::{BusError, PlatformError},
    traits::{IndicatorInterface, LinkPortInterface},
};

/// Register FIFO depth per direction (mirrors the 8-deep hardware FIFO)
pub const FIFO_DEPTH: usize = 8;

/// Which end of the wire an endpoint is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireSide {
    A,
    B,
}

impl WireSide {
    fn other(self) -> WireSide {
        match self {
            WireSide::A => WireSide::B,
            WireSide::B => WireSide::A,
        }
    }
}

type Fifo = Mutex<RefCell<Deque<u8, FIFO_DEPTH>>>;

/// Shared two-ended wire: byte FIFOs plus indicator flags
pub struct MockWire {
    a_to_b: Fifo,
    b_to_a: Fifo,
    indicator_a: AtomicBool,
    indicator_b: AtomicBool,
    jam_a: AtomicBool,
    jam_b: AtomicBool,
}

impl MockWire {
    /// Create an idle wire: empty FIFOs, both indicators Passive
    pub const fn new() -> Self {
        Self {
            a_to_b: Mutex::new(RefCell::new(Deque::new())),
            b_to_a: Mutex::new(RefCell::new(Deque::new())),
            indicator_a: AtomicBool::new(false),
            indicator_b: AtomicBool::new(false),
            jam_a: AtomicBool::new(false),
            jam_b: AtomicBool::new(false),
        }
    }

    /// Borrow the byte port for one side
    pub fn port(&self, side: WireSide) -> MockLinkPort<'_> {
        MockLinkPort { wire: self, side }
    }

    /// Borrow the indicator pair for one side
    pub fn indicator(&self, side: WireSide) -> MockIndicator<'_> {
        MockIndicator { wire: self, side }
    }

    /// Wedge or release one side's transmit register (timeout injection)
    pub fn set_jammed(&self, side: WireSide, jammed: bool) {
        self.jam_flag(side).store(jammed, Ordering::Relaxed);
    }

    /// Read one side's indicator line (test assertions)
    pub fn indicator_raised(&self, side: WireSide) -> bool {
        self.indicator_flag(side).load(Ordering::Relaxed)
    }

    /// Drive one side's indicator line directly (hand-rolled peer tests)
    pub fn drive_indicator(&self, side: WireSide, active: bool) {
        self.indicator_flag(side).store(active, Ordering::Relaxed);
    }

    /// Push a byte into the FIFO that `to` reads from (hand-rolled peer)
    ///
    /// Returns `false` when the FIFO is full.
    pub fn inject(&self, to: WireSide, byte: u8) -> bool {
        critical_section::with(|cs| {
            self.fifo_into(to).borrow_ref_mut(cs).push_back(byte).is_ok()
        })
    }

    /// Pop the next byte written by `from` (hand-rolled peer)
    pub fn take_outgoing(&self, from: WireSide) -> Option<u8> {
        critical_section::with(|cs| self.fifo_into(from.other()).borrow_ref_mut(cs).pop_front())
    }

    /// Number of bytes queued toward `to`
    pub fn pending_toward(&self, to: WireSide) -> usize {
        critical_section::with(|cs| self.fifo_into(to).borrow_ref(cs).len())
    }

    fn fifo_into(&self, to: WireSide) -> &Fifo {
        match to {
            WireSide::A => &self.b_to_a,
            WireSide::B => &self.a_to_b,
        }
    }

    fn indicator_flag(&self, side: WireSide) -> &AtomicBool {
        match side {
            WireSide::A => &self.indicator_a,
            WireSide::B => &self.indicator_b,
        }
    }

    fn jam_flag(&self, side: WireSide) -> &AtomicBool {
        match side {
            WireSide::A => &self.jam_a,
            WireSide::B => &self.jam_b,
        }
    }
}

impl Default for MockWire {
    fn default() -> Self {
        Self::new()
    }
}

/// One side's byte port on a `MockWire`
pub struct MockLinkPort<'w> {
    wire: &'w MockWire,
    side: WireSide,
}

impl LinkPortInterface for MockLinkPort<'_> {
    fn tx_ready(&self) -> bool {
        if self.wire.jam_flag(self.side).load(Ordering::Relaxed) {
            return false;
        }
        critical_section::with(|cs| {
            !self
                .wire
                .fifo_into(self.side.other())
                .borrow_ref(cs)
                .is_full()
        })
    }

    fn rx_ready(&self) -> bool {
        critical_section::with(|cs| !self.wire.fifo_into(self.side).borrow_ref(cs).is_empty())
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        if self.wire.jam_flag(self.side).load(Ordering::Relaxed) {
            return Err(PlatformError::Bus(BusError::TxNotReady));
        }
        critical_section::with(|cs| {
            self.wire
                .fifo_into(self.side.other())
                .borrow_ref_mut(cs)
                .push_back(byte)
                .map_err(|_| PlatformError::Bus(BusError::TxNotReady))
        })
    }

    fn recv(&mut self) -> Result<u8> {
        critical_section::with(|cs| {
            self.wire
                .fifo_into(self.side)
                .borrow_ref_mut(cs)
                .pop_front()
                .ok_or(PlatformError::Bus(BusError::RxEmpty))
        })
    }
}

/// One side's indicator pair on a `MockWire`
pub struct MockIndicator<'w> {
    wire: &'w MockWire,
    side: WireSide,
}

impl IndicatorInterface for MockIndicator<'_> {
    fn set_active(&mut self) -> Result<()> {
        self.wire
            .indicator_flag(self.side)
            .store(true, Ordering::Relaxed);
        Ok(())
    }

    fn set_passive(&mut self) -> Result<()> {
        self.wire
            .indicator_flag(self.side)
            .store(false, Ordering::Relaxed);
        Ok(())
    }

    fn peer_active(&self) -> bool {
        self.wire
            .indicator_flag(self.side.other())
            .load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_cross_the_wire() {
        let wire = MockWire::new();
        let mut a = wire.port(WireSide::A);
        let mut b = wire.port(WireSide::B);

        assert!(a.tx_ready());
        assert!(!b.rx_ready());

        a.send(0x42).unwrap();
        assert!(b.rx_ready());
        assert_eq!(b.recv().unwrap(), 0x42);
        assert!(!b.rx_ready());
        assert_eq!(b.recv(), Err(PlatformError::Bus(BusError::RxEmpty)));
    }

    #[test]
    fn test_fifo_depth_limits_writes() {
        let wire = MockWire::new();
        let mut a = wire.port(WireSide::A);

        for i in 0..FIFO_DEPTH as u8 {
            a.send(i).unwrap();
        }
        assert!(!a.tx_ready());
        assert_eq!(a.send(0xFF), Err(PlatformError::Bus(BusError::TxNotReady)));

        let mut b = wire.port(WireSide::B);
        assert_eq!(b.recv().unwrap(), 0);
        assert!(a.tx_ready());
    }

    #[test]
    fn test_jam_blocks_transmit() {
        let wire = MockWire::new();
        let mut a = wire.port(WireSide::A);

        wire.set_jammed(WireSide::A, true);
        assert!(!a.tx_ready());
        assert_eq!(a.send(0x01), Err(PlatformError::Bus(BusError::TxNotReady)));

        wire.set_jammed(WireSide::A, false);
        assert!(a.tx_ready());
        a.send(0x01).unwrap();
    }

    #[test]
    fn test_indicators_are_shared() {
        let wire = MockWire::new();
        let mut a = wire.indicator(WireSide::A);
        let b = wire.indicator(WireSide::B);

        assert!(!b.peer_active());
        a.set_active().unwrap();
        assert!(b.peer_active());
        assert!(wire.indicator_raised(WireSide::A));
        assert!(!a.peer_active());

        a.set_passive().unwrap();
        assert!(!b.peer_active());
    }
}
