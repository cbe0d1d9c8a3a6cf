//! Link driver
//!
//! Per-attempt engine that moves one frame across the inter-board bus.
//! One attempt walks `Idle → token sync → length → header+payload →
//! drain → Idle`, with a direct edge from every phase back to `Idle` on
//! any fault. The indicator line is raised while an attempt is live and
//! is lowered on every exit path, success or fault.
//!
//! The driver is a stepped engine: `start_send`/`start_recv` arm it and
//! `poll` moves at most one byte in each direction per call. That lets
//! host tests drive two boards in deterministic lockstep. On target the
//! blocking wrappers (`send_frame`, `recv_frame`) spin `poll` with the
//! configured pacing delay.
//!
//! Timeouts come from the injected `TimerInterface` clock, one budget per
//! phase: a whole-handshake budget, a per-byte budget during data, and a
//! drain budget at the end.

use crate::platform::traits::{IndicatorInterface, LinkPortInterface, TimerInterface};

use super::wire::{
    self, LENGTH_PREFIX_LEN, MAX_FRAME_LEN, SyncStep, TokenMatcher, decode_length, encode_length,
};

/// Link timing budgets, all in microseconds
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// Budget for the whole token handshake
    pub sync_timeout_us: u64,
    /// Sender re-probe interval while no reply arrives
    pub probe_interval_us: u64,
    /// Budget per data byte after the handshake
    pub byte_timeout_us: u64,
    /// Budget for the peer to sign off after the last byte
    pub drain_timeout_us: u64,
    /// Pacing delay between polls in the blocking wrappers
    pub poll_interval_us: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sync_timeout_us: 250_000,
            probe_interval_us: 500,
            byte_timeout_us: 5_000,
            drain_timeout_us: 50_000,
            poll_interval_us: 50,
        }
    }
}

/// Why a link attempt ended without a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Peer indicator dropped mid-transfer
    PeerDropped,
    /// Both sides took the same role
    Conflict,
    /// A phase budget expired mid-transfer
    Timeout,
    /// Bus or bookkeeping failure
    Internal,
    /// Peer never answered the handshake
    Unresponsive,
    /// Frame larger than the wire allows
    Oversize,
}

impl LinkError {
    /// Numeric status code shared with diagnostic tooling
    pub const fn code(self) -> i8 {
        match self {
            LinkError::PeerDropped => wire::status::PEER_DROPPED,
            LinkError::Conflict => wire::status::CONFLICT,
            LinkError::Timeout => wire::status::TIMEOUT,
            LinkError::Internal => wire::status::INTERNAL,
            LinkError::Unresponsive => wire::status::UNRESPONSIVE,
            LinkError::Oversize => wire::status::OVERSIZE,
        }
    }

    /// Faults worth retrying on a later pass
    ///
    /// Transient faults leave the packet queued; the rest mean the frame
    /// itself is unsendable and must be dropped.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            LinkError::PeerDropped
                | LinkError::Conflict
                | LinkError::Timeout
                | LinkError::Unresponsive
        )
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkError::PeerDropped => write!(f, "peer dropped mid-transfer"),
            LinkError::Conflict => write!(f, "link role conflict"),
            LinkError::Timeout => write!(f, "link timeout"),
            LinkError::Internal => write!(f, "internal link failure"),
            LinkError::Unresponsive => write!(f, "peer unresponsive"),
            LinkError::Oversize => write!(f, "frame exceeds link capability"),
        }
    }
}

/// A fault plus how many frame bytes had moved when it hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkFault {
    pub error: LinkError,
    pub transferred: usize,
}

/// What one `poll` call observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// No attempt armed
    Idle,
    /// Attempt in progress, nothing to report yet
    Pending,
    /// Outbound frame fully transferred and acknowledged by sign-off
    SendComplete { bytes: usize },
    /// Inbound frame complete; contents available via `frame()`
    RecvComplete { frame_len: usize },
    /// Attempt aborted; indicator already lowered
    Fault(LinkFault),
}

enum Phase {
    Idle,
    SendSync,
    SendData,
    SendDrain,
    RecvSync,
    RecvLength,
    RecvData,
}

/// Stepped frame mover over one board's end of the link
pub struct LinkDriver<P: LinkPortInterface, I: IndicatorInterface, T: TimerInterface> {
    port: P,
    indicator: I,
    timer: T,
    config: LinkConfig,
    phase: Phase,
    matcher: TokenMatcher,
    /// Staged outbound bytes (prefix included) or received frame bytes
    frame: [u8; LENGTH_PREFIX_LEN + MAX_FRAME_LEN],
    /// Total bytes staged for send, or expected/received frame length
    frame_len: usize,
    /// Bytes moved so far in the current phase
    cursor: usize,
    prefix: [u8; LENGTH_PREFIX_LEN],
    deadline_us: u64,
    next_probe_us: u64,
    bytes_seen: bool,
    peer_was_active: bool,
}

impl<P: LinkPortInterface, I: IndicatorInterface, T: TimerInterface> LinkDriver<P, I, T> {
    pub fn new(port: P, indicator: I, timer: T, config: LinkConfig) -> Self {
        Self {
            port,
            indicator,
            timer,
            config,
            phase: Phase::Idle,
            matcher: TokenMatcher::sender(),
            frame: [0; LENGTH_PREFIX_LEN + MAX_FRAME_LEN],
            frame_len: 0,
            cursor: 0,
            prefix: [0; LENGTH_PREFIX_LEN],
            deadline_us: 0,
            next_probe_us: 0,
            bytes_seen: false,
            peer_was_active: false,
        }
    }

    /// No attempt armed
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Current state of the peer's indicator line
    pub fn peer_active(&self) -> bool {
        self.indicator.peer_active()
    }

    /// Received frame bytes; valid after `RecvComplete` until the next start
    pub fn frame(&self) -> &[u8] {
        &self.frame[..self.frame_len]
    }

    /// Arm an outbound attempt for `data` (header + payload)
    ///
    /// Oversize data is refused before the indicator or wire is touched.
    pub fn start_send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_idle() {
            return Err(LinkError::Internal);
        }
        if data.len() > MAX_FRAME_LEN {
            return Err(LinkError::Oversize);
        }

        self.frame[..LENGTH_PREFIX_LEN].copy_from_slice(&encode_length(data.len()));
        self.frame[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + data.len()].copy_from_slice(data);
        self.frame_len = LENGTH_PREFIX_LEN + data.len();
        self.cursor = 0;
        self.matcher = TokenMatcher::sender();
        self.bytes_seen = false;
        self.peer_was_active = self.indicator.peer_active();

        let now = self.timer.now_us();
        self.deadline_us = now + self.config.sync_timeout_us;
        self.indicator.set_active().map_err(|_| LinkError::Internal)?;

        // Prime the handshake with the token's first character. Replies
        // drive the rest; the probe timer only covers lost ones.
        if self.port.tx_ready() && self.port.send(self.matcher.probe()).is_ok() {
            self.next_probe_us = now + self.config.probe_interval_us;
        } else {
            self.next_probe_us = now;
        }
        self.phase = Phase::SendSync;
        Ok(())
    }

    /// Arm an inbound attempt
    ///
    /// Callers claim a destination slot before arming, so a completed
    /// frame always has somewhere to go.
    pub fn start_recv(&mut self) -> Result<(), LinkError> {
        if !self.is_idle() {
            return Err(LinkError::Internal);
        }
        self.frame_len = 0;
        self.cursor = 0;
        self.matcher = TokenMatcher::receiver();
        self.bytes_seen = false;
        self.peer_was_active = true;

        self.deadline_us = self.timer.now_us() + self.config.sync_timeout_us;
        self.indicator.set_active().map_err(|_| LinkError::Internal)?;
        self.phase = Phase::RecvSync;
        Ok(())
    }

    /// Abandon the current attempt, lowering the indicator
    pub fn abort(&mut self) {
        let _ = self.indicator.set_passive();
        self.phase = Phase::Idle;
    }

    /// Advance the current attempt by at most one byte each direction
    pub fn poll(&mut self) -> LinkEvent {
        match self.phase {
            Phase::Idle => LinkEvent::Idle,
            Phase::SendSync => self.poll_send_sync(),
            Phase::SendData => self.poll_send_data(),
            Phase::SendDrain => self.poll_send_drain(),
            Phase::RecvSync => self.poll_recv_sync(),
            Phase::RecvLength => self.poll_recv_length(),
            Phase::RecvData => self.poll_recv_data(),
        }
    }

    /// Blocking outbound transfer; returns wire bytes moved
    pub fn send_frame(&mut self, data: &[u8]) -> Result<usize, LinkFault> {
        self.start_send(data).map_err(|error| LinkFault {
            error,
            transferred: 0,
        })?;
        loop {
            match self.poll() {
                LinkEvent::Pending => self.pace(),
                LinkEvent::SendComplete { bytes } => return Ok(bytes),
                LinkEvent::Fault(fault) => return Err(fault),
                LinkEvent::Idle | LinkEvent::RecvComplete { .. } => {
                    return Err(LinkFault {
                        error: LinkError::Internal,
                        transferred: 0,
                    });
                }
            }
        }
    }

    /// Blocking inbound transfer; returns the received frame length
    pub fn recv_frame(&mut self) -> Result<usize, LinkFault> {
        self.start_recv().map_err(|error| LinkFault {
            error,
            transferred: 0,
        })?;
        loop {
            match self.poll() {
                LinkEvent::Pending => self.pace(),
                LinkEvent::RecvComplete { frame_len } => return Ok(frame_len),
                LinkEvent::Fault(fault) => return Err(fault),
                LinkEvent::Idle | LinkEvent::SendComplete { .. } => {
                    return Err(LinkFault {
                        error: LinkError::Internal,
                        transferred: 0,
                    });
                }
            }
        }
    }

    /// Sleep one poll interval
    pub(crate) fn pace(&mut self) {
        let _ = self.timer.delay_us(self.config.poll_interval_us);
    }

    fn transferred(&self) -> usize {
        match self.phase {
            Phase::SendData | Phase::RecvData => self.cursor,
            Phase::SendDrain => self.frame_len,
            _ => 0,
        }
    }

    fn fault(&mut self, error: LinkError) -> LinkEvent {
        let transferred = self.transferred();
        let _ = self.indicator.set_passive();
        self.phase = Phase::Idle;
        LinkEvent::Fault(LinkFault { error, transferred })
    }

    fn expiry_fault(&mut self) -> LinkEvent {
        if self.bytes_seen {
            self.fault(LinkError::Timeout)
        } else {
            self.fault(LinkError::Unresponsive)
        }
    }

    fn poll_send_sync(&mut self) -> LinkEvent {
        let now = self.timer.now_us();

        // Bytes already in the register outrank the indicator level: a
        // queued conflict byte still faults as Conflict after the peer
        // lowers its line.
        if self.port.rx_ready() {
            let byte = match self.port.recv() {
                Ok(byte) => byte,
                Err(_) => return self.fault(LinkError::Internal),
            };
            self.bytes_seen = true;
            match self.matcher.advance(byte) {
                SyncStep::Complete => {
                    self.phase = Phase::SendData;
                    self.deadline_us = now + self.config.byte_timeout_us;
                    return LinkEvent::Pending;
                }
                SyncStep::Conflict => return self.fault(LinkError::Conflict),
                SyncStep::Progress | SyncStep::Restart => {
                    // Reply arrived; answer with the next probe right away
                    self.next_probe_us = now;
                }
            }
        }

        if self.indicator.peer_active() {
            self.peer_was_active = true;
        } else if self.peer_was_active {
            return self.fault(LinkError::PeerDropped);
        }

        if now >= self.next_probe_us && self.port.tx_ready() {
            if self.port.send(self.matcher.probe()).is_err() {
                return self.fault(LinkError::Internal);
            }
            self.next_probe_us = now + self.config.probe_interval_us;
        }

        if now >= self.deadline_us {
            return self.expiry_fault();
        }
        LinkEvent::Pending
    }

    fn poll_send_data(&mut self) -> LinkEvent {
        let now = self.timer.now_us();
        if !self.indicator.peer_active() {
            return self.fault(LinkError::PeerDropped);
        }

        if self.cursor < self.frame_len && self.port.tx_ready() {
            if self.port.send(self.frame[self.cursor]).is_err() {
                return self.fault(LinkError::Internal);
            }
            self.cursor += 1;
            if self.cursor == self.frame_len {
                self.phase = Phase::SendDrain;
                self.deadline_us = now + self.config.drain_timeout_us;
            } else {
                self.deadline_us = now + self.config.byte_timeout_us;
            }
            return LinkEvent::Pending;
        }

        if now >= self.deadline_us {
            return self.fault(LinkError::Timeout);
        }
        LinkEvent::Pending
    }

    fn poll_send_drain(&mut self) -> LinkEvent {
        if !self.indicator.peer_active() {
            // Peer signed off: everything arrived
            let bytes = self.frame_len;
            let _ = self.indicator.set_passive();
            self.phase = Phase::Idle;
            return LinkEvent::SendComplete { bytes };
        }
        if self.timer.now_us() >= self.deadline_us {
            return self.fault(LinkError::Timeout);
        }
        LinkEvent::Pending
    }

    fn poll_recv_sync(&mut self) -> LinkEvent {
        let now = self.timer.now_us();
        if !self.indicator.peer_active() {
            return self.fault(LinkError::PeerDropped);
        }

        if self.port.rx_ready() {
            let byte = match self.port.recv() {
                Ok(byte) => byte,
                Err(_) => return self.fault(LinkError::Internal),
            };
            self.bytes_seen = true;
            let step = self.matcher.advance(byte);
            if step == SyncStep::Conflict {
                return self.fault(LinkError::Conflict);
            }
            // Echo for every byte heard; a missed echo (register busy)
            // just makes the sender re-probe.
            if self.port.tx_ready() && self.port.send(self.matcher.reply()).is_err() {
                return self.fault(LinkError::Internal);
            }
            if step == SyncStep::Complete {
                self.phase = Phase::RecvLength;
                self.cursor = 0;
                self.deadline_us = now + self.config.byte_timeout_us;
            }
            return LinkEvent::Pending;
        }

        if now >= self.deadline_us {
            return self.expiry_fault();
        }
        LinkEvent::Pending
    }

    fn poll_recv_length(&mut self) -> LinkEvent {
        let now = self.timer.now_us();
        if !self.indicator.peer_active() {
            return self.fault(LinkError::PeerDropped);
        }

        if self.port.rx_ready() {
            let byte = match self.port.recv() {
                Ok(byte) => byte,
                Err(_) => return self.fault(LinkError::Internal),
            };
            self.prefix[self.cursor] = byte;
            self.cursor += 1;
            self.deadline_us = now + self.config.byte_timeout_us;
            if self.cursor == LENGTH_PREFIX_LEN {
                let declared = decode_length(&self.prefix);
                // Validate before any payload byte is accepted
                if declared < wire::HEADER_LEN || declared > MAX_FRAME_LEN {
                    return self.fault(LinkError::Oversize);
                }
                self.frame_len = declared;
                self.cursor = 0;
                self.phase = Phase::RecvData;
            }
            return LinkEvent::Pending;
        }

        if now >= self.deadline_us {
            return self.fault(LinkError::Timeout);
        }
        LinkEvent::Pending
    }

    fn poll_recv_data(&mut self) -> LinkEvent {
        let now = self.timer.now_us();
        if !self.indicator.peer_active() {
            return self.fault(LinkError::PeerDropped);
        }

        if self.port.rx_ready() {
            let byte = match self.port.recv() {
                Ok(byte) => byte,
                Err(_) => return self.fault(LinkError::Internal),
            };
            self.frame[self.cursor] = byte;
            self.cursor += 1;
            self.deadline_us = now + self.config.byte_timeout_us;
            if self.cursor == self.frame_len {
                // Whole frame in hand; sign off so the sender's drain ends
                let _ = self.indicator.set_passive();
                self.phase = Phase::Idle;
                return LinkEvent::RecvComplete {
                    frame_len: self.frame_len,
                };
            }
            return LinkEvent::Pending;
        }

        if now >= self.deadline_us {
            return self.fault(LinkError::Timeout);
        }
        LinkEvent::Pending
    }
}
