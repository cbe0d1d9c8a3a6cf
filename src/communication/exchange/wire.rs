//! Wire format
//!
//! Everything both boards must agree on byte for byte: the resync tokens,
//! the length prefix, the header layout, the inline value encoding, and
//! the numeric status codes. The link driver moves the bytes; this module
//! defines what the bytes are.
//!
//! # Frame layout
//!
//! ```text
//! <token handshake> [len lo] [len hi] [to] [from] [type] [payload ...]
//! ```
//!
//! The length prefix counts header plus payload. Payload length is fixed
//! per packet type, so the prefix doubles as a consistency check.
//!
//! # Token handshake
//!
//! Tokens are exchanged one character at a time with echo-back
//! validation. The sender transmits successive characters of `"?SNCTX"`
//! and matches replies against `"?SNCRX"`; the receiver is reactive,
//! echoing its own next character for each matched sender character.
//! Both tokens share the `"?SNC"` prefix and differ only at index 4, so
//! reading your own role's discriminator character there means the peer
//! is in the same role: a conflict.

use super::node::NodeId;
use super::packet::{
    CommandCode, CommandValue, EventCode, EventValue, INLINE_WIRE_LEN, Packet, PacketPayload,
    PacketType, ResponseCode, ResponseValue,
};
use super::pool::SLOT_CAPACITY;

/// Token length in bytes
pub const TOKEN_LEN: usize = 6;

/// Token the sending side transmits during resync
pub const SYNC_TX: [u8; TOKEN_LEN] = *b"?SNCTX";

/// Token the receiving side transmits during resync
pub const SYNC_RX: [u8; TOKEN_LEN] = *b"?SNCRX";

/// Index where the two tokens differ (`'T'` vs `'R'`)
pub const SYNC_DISCRIMINATOR: usize = 4;

/// Reply a receiver gives when it has nothing matched yet
pub const SYNC_FILLER: u8 = 0x00;

/// Header bytes: `to`, `from`, `type`
pub const HEADER_LEN: usize = 3;

/// Length prefix bytes (little-endian u16)
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest frame (header + payload) either side accepts
pub const MAX_FRAME_LEN: usize = HEADER_LEN + SLOT_CAPACITY;

/// Numeric status codes reported for link operations
///
/// Shared across firmware revisions; diagnostic tooling knows these
/// values, so they must not be renumbered.
pub mod status {
    /// Nothing transferred
    pub const NONE: i8 = 0;
    /// Peer indicator dropped mid-transfer
    pub const PEER_DROPPED: i8 = -1;
    /// Both sides took the same role
    pub const CONFLICT: i8 = -2;
    /// A byte budget expired mid-transfer
    pub const TIMEOUT: i8 = -3;
    /// Internal failure
    pub const INTERNAL: i8 = -4;
    /// Peer never answered the handshake
    pub const UNRESPONSIVE: i8 = -5;
    /// Requested size exceeds capability
    pub const OVERSIZE: i8 = -6;
}

/// Wire-level decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    UnknownNode(u8),
    UnknownType(u8),
    /// Declared or received length disagrees with the per-type table
    LengthMismatch { kind: PacketType, got: usize },
    UnknownCode(u16),
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::UnknownNode(value) => write!(f, "unknown node {value}"),
            WireError::UnknownType(value) => write!(f, "unknown packet type {value}"),
            WireError::LengthMismatch { kind, got } => {
                write!(f, "bad payload length {got} for {kind:?}")
            }
            WireError::UnknownCode(value) => write!(f, "unknown inline code {value}"),
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WireHeader {
    pub to: NodeId,
    pub from: NodeId,
    pub kind: PacketType,
}

/// Header bytes for a packet
pub fn encode_header(packet: &Packet) -> [u8; HEADER_LEN] {
    [packet.to as u8, packet.from as u8, packet.kind() as u8]
}

/// Decode a frame header
pub fn decode_header(bytes: &[u8; HEADER_LEN]) -> Result<WireHeader, WireError> {
    let to = NodeId::from_u8(bytes[0]).ok_or(WireError::UnknownNode(bytes[0]))?;
    let from = NodeId::from_u8(bytes[1]).ok_or(WireError::UnknownNode(bytes[1]))?;
    let kind = PacketType::from_u8(bytes[2]).ok_or(WireError::UnknownType(bytes[2]))?;
    Ok(WireHeader { to, from, kind })
}

/// Length prefix for a frame of `len` bytes
pub fn encode_length(len: usize) -> [u8; LENGTH_PREFIX_LEN] {
    (len as u16).to_le_bytes()
}

/// Decode a length prefix
pub fn decode_length(bytes: &[u8; LENGTH_PREFIX_LEN]) -> usize {
    u16::from_le_bytes(*bytes) as usize
}

/// Encode an inline value payload
///
/// Layout: code (u16 LE), value (u32 LE), two padding zeroes. Returns
/// `None` for payloads that do not travel inline.
pub fn encode_inline(payload: &PacketPayload) -> Option<[u8; INLINE_WIRE_LEN]> {
    let (code, value) = match payload {
        PacketPayload::Command(v) => (v.code as u16, v.arg),
        PacketPayload::Response(v) => (v.code as u16, v.value),
        PacketPayload::LogEvent(v) => (v.code as u16, v.detail),
        _ => return None,
    };
    let mut bytes = [0u8; INLINE_WIRE_LEN];
    bytes[..2].copy_from_slice(&code.to_le_bytes());
    bytes[2..6].copy_from_slice(&value.to_le_bytes());
    Some(bytes)
}

/// Decode an inline value payload for the given wire type
pub fn decode_inline(
    kind: PacketType,
    bytes: &[u8; INLINE_WIRE_LEN],
) -> Result<PacketPayload, WireError> {
    let code = u16::from_le_bytes([bytes[0], bytes[1]]);
    let value = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    match kind {
        PacketType::Command => CommandCode::from_u16(code)
            .map(|code| PacketPayload::Command(CommandValue { code, arg: value }))
            .ok_or(WireError::UnknownCode(code)),
        PacketType::Response => ResponseCode::from_u16(code)
            .map(|code| PacketPayload::Response(ResponseValue { code, value }))
            .ok_or(WireError::UnknownCode(code)),
        PacketType::LogEvent => EventCode::from_u16(code)
            .map(|code| PacketPayload::LogEvent(EventValue { code, detail: value }))
            .ok_or(WireError::UnknownCode(code)),
        other => Err(WireError::UnknownType(other as u8)),
    }
}

/// Outcome of feeding one peer byte to a `TokenMatcher`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncStep {
    /// Byte matched; more to go
    Progress,
    /// Byte mismatched; matching restarted
    Restart,
    /// Whole counter-token observed
    Complete,
    /// Peer is in our own role
    Conflict,
}

/// Incremental token matcher, one per handshake attempt
///
/// Tracks how much of the peer's token has been seen and derives what to
/// transmit next. The same type serves both roles; only which token is
/// "own" differs.
pub struct TokenMatcher {
    own: &'static [u8; TOKEN_LEN],
    expect: &'static [u8; TOKEN_LEN],
    cursor: usize,
}

impl TokenMatcher {
    /// Matcher for the sending role
    pub fn sender() -> Self {
        Self {
            own: &SYNC_TX,
            expect: &SYNC_RX,
            cursor: 0,
        }
    }

    /// Matcher for the receiving role
    pub fn receiver() -> Self {
        Self {
            own: &SYNC_RX,
            expect: &SYNC_TX,
            cursor: 0,
        }
    }

    /// Feed one byte from the peer
    pub fn advance(&mut self, byte: u8) -> SyncStep {
        if self.cursor >= TOKEN_LEN {
            return SyncStep::Complete;
        }
        if byte == self.expect[self.cursor] {
            self.cursor += 1;
            return if self.cursor == TOKEN_LEN {
                SyncStep::Complete
            } else {
                SyncStep::Progress
            };
        }
        if self.cursor == SYNC_DISCRIMINATOR && byte == self.own[SYNC_DISCRIMINATOR] {
            return SyncStep::Conflict;
        }
        self.cursor = usize::from(byte == self.expect[0]);
        SyncStep::Restart
    }

    /// Next character of our own token to transmit (sender probing)
    pub fn probe(&self) -> u8 {
        self.own[self.cursor.min(TOKEN_LEN - 1)]
    }

    /// Echo for the last matched position (receiver replying)
    ///
    /// Filler when nothing is matched, so the peer restarts cleanly.
    pub fn reply(&self) -> u8 {
        if self.cursor > 0 {
            self.own[self.cursor - 1]
        } else {
            SYNC_FILLER
        }
    }

    /// Characters of the peer token matched so far
    pub fn matched(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::exchange::pool::SlotId;

    #[test]
    fn test_token_literals() {
        assert_eq!(&SYNC_TX, b"?SNCTX");
        assert_eq!(&SYNC_RX, b"?SNCRX");
        assert_eq!(SYNC_TX[SYNC_DISCRIMINATOR], b'T');
        assert_eq!(SYNC_RX[SYNC_DISCRIMINATOR], b'R');
        // Identical everywhere else, which is what makes the
        // discriminator position the conflict detector.
        for i in 0..TOKEN_LEN {
            if i != SYNC_DISCRIMINATOR {
                assert_eq!(SYNC_TX[i], SYNC_RX[i]);
            }
        }
    }

    #[test]
    fn test_handshake_lockstep() {
        let mut sender = TokenMatcher::sender();
        let mut receiver = TokenMatcher::receiver();
        let mut sent = [0u8; TOKEN_LEN];
        let mut echoed = [0u8; TOKEN_LEN];

        for i in 0..TOKEN_LEN {
            let probe = sender.probe();
            sent[i] = probe;
            let step = receiver.advance(probe);
            if i < TOKEN_LEN - 1 {
                assert_eq!(step, SyncStep::Progress);
            } else {
                assert_eq!(step, SyncStep::Complete);
            }

            let echo = receiver.reply();
            echoed[i] = echo;
            let step = sender.advance(echo);
            if i < TOKEN_LEN - 1 {
                assert_eq!(step, SyncStep::Progress);
            } else {
                assert_eq!(step, SyncStep::Complete);
            }
        }

        assert_eq!(&sent, b"?SNCTX");
        assert_eq!(&echoed, b"?SNCRX");
    }

    #[test]
    fn test_garbage_restarts_matching() {
        let mut receiver = TokenMatcher::receiver();
        assert_eq!(receiver.advance(b'?'), SyncStep::Progress);
        assert_eq!(receiver.advance(b'S'), SyncStep::Progress);

        // Noise byte: cursor resets, reply is the filler
        assert_eq!(receiver.advance(0x55), SyncStep::Restart);
        assert_eq!(receiver.matched(), 0);
        assert_eq!(receiver.reply(), SYNC_FILLER);

        // A restart byte that is itself the token start counts as matched
        assert_eq!(receiver.advance(b'?'), SyncStep::Restart);
        assert_eq!(receiver.matched(), 1);
        assert_eq!(receiver.reply(), b'?');
    }

    #[test]
    fn test_dueling_senders_conflict_at_discriminator() {
        let mut a = TokenMatcher::sender();
        let mut b = TokenMatcher::sender();

        // Each side consumes the other's probes; the shared prefix
        // matches, the discriminator exposes the role clash.
        for _ in 0..SYNC_DISCRIMINATOR {
            let from_b = b.probe();
            assert_eq!(a.advance(from_b), SyncStep::Progress);
            let from_a = a.probe();
            assert_eq!(b.advance(from_a), SyncStep::Progress);
        }
        assert_eq!(a.advance(b.probe()), SyncStep::Conflict);
        assert_eq!(b.advance(a.probe()), SyncStep::Conflict);
    }

    #[test]
    fn test_header_round_trip() {
        let packet = Packet::ping(NodeId::DataAcquisition, NodeId::Commander);
        let bytes = encode_header(&packet);
        assert_eq!(bytes, [6, 1, 1]);

        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.to, NodeId::DataAcquisition);
        assert_eq!(header.from, NodeId::Commander);
        assert_eq!(header.kind, PacketType::Ping);

        assert_eq!(decode_header(&[200, 1, 1]), Err(WireError::UnknownNode(200)));
        assert_eq!(decode_header(&[6, 1, 42]), Err(WireError::UnknownType(42)));
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        assert_eq!(encode_length(0x0102), [0x02, 0x01]);
        assert_eq!(decode_length(&[0x02, 0x01]), 0x0102);
        assert_eq!(decode_length(&encode_length(MAX_FRAME_LEN)), MAX_FRAME_LEN);
    }

    #[test]
    fn test_inline_value_round_trip() {
        let payload = PacketPayload::Command(CommandValue {
            code: CommandCode::SetPowerMode,
            arg: 0xDEAD_BEEF,
        });
        let bytes = encode_inline(&payload).unwrap();
        assert_eq!(bytes, [4, 0, 0xEF, 0xBE, 0xAD, 0xDE, 0, 0]);
        assert_eq!(decode_inline(PacketType::Command, &bytes), Ok(payload));

        let payload = PacketPayload::Response(ResponseValue {
            code: ResponseCode::Ping,
            value: 7,
        });
        let bytes = encode_inline(&payload).unwrap();
        assert_eq!(decode_inline(PacketType::Response, &bytes), Ok(payload));

        // Unknown code on the wire is a decode error
        let bytes = [0xFF, 0x7F, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_inline(PacketType::LogEvent, &bytes),
            Err(WireError::UnknownCode(0x7FFF))
        );
    }

    #[test]
    fn test_non_inline_payloads_have_no_inline_encoding() {
        assert_eq!(encode_inline(&PacketPayload::Ping), None);
        assert_eq!(encode_inline(&PacketPayload::None), None);
        let frame = PacketPayload::Frame {
            kind: crate::communication::exchange::packet::FrameKind::OcrFrame,
            slot: SlotId(0),
        };
        assert_eq!(encode_inline(&frame), None);
    }
}
