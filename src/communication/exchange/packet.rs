//! Packet model
//!
//! A `Packet` is the unit every task produces and consumes: a destination,
//! a source, and a payload. The wire type tag is derived from the payload
//! variant, so a packet whose tag disagrees with its contents cannot be
//! constructed. Small values travel inline; bulk data travels as a pool
//! slot reference and only the slot contents cross the link.

use super::node::NodeId;
use super::pool::SlotId;

/// Wire type tag
///
/// Discriminants are wire bytes shared by both boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Nothing = 0,
    Ping = 1,
    Command = 2,
    Response = 3,
    LogEvent = 4,
    Configuration = 5,
    SpectrometerFrame = 6,
    OcrFrame = 7,
    McomsFrame = 8,
    ProfileInfo = 9,
    ProfileData = 10,
}

impl PacketType {
    /// Decode a wire type byte
    pub const fn from_u8(value: u8) -> Option<PacketType> {
        match value {
            0 => Some(PacketType::Nothing),
            1 => Some(PacketType::Ping),
            2 => Some(PacketType::Command),
            3 => Some(PacketType::Response),
            4 => Some(PacketType::LogEvent),
            5 => Some(PacketType::Configuration),
            6 => Some(PacketType::SpectrometerFrame),
            7 => Some(PacketType::OcrFrame),
            8 => Some(PacketType::McomsFrame),
            9 => Some(PacketType::ProfileInfo),
            10 => Some(PacketType::ProfileData),
            _ => None,
        }
    }

    /// Exact payload byte count this type carries on the wire
    ///
    /// Frame contents are opaque to the exchange; the sizes are fixed by
    /// the producing tasks and shared by both boards.
    pub const fn wire_payload_len(self) -> usize {
        match self {
            PacketType::Nothing | PacketType::Ping => 0,
            PacketType::Command | PacketType::Response | PacketType::LogEvent => INLINE_WIRE_LEN,
            PacketType::Configuration => 256,
            PacketType::SpectrometerFrame => 2056,
            PacketType::OcrFrame => 40,
            PacketType::McomsFrame => 28,
            PacketType::ProfileInfo => 64,
            PacketType::ProfileData => 1024,
        }
    }

    /// True for types whose payload lives in a pool slot
    pub const fn is_buffered(self) -> bool {
        FrameKind::from_packet_type(self).is_some()
    }
}

/// Wire size of the inline value encoding (code + argument + padding)
pub const INLINE_WIRE_LEN: usize = 8;

/// Bulk payload kinds (the buffered subset of `PacketType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    Configuration,
    SpectrometerFrame,
    OcrFrame,
    McomsFrame,
    ProfileInfo,
    ProfileData,
}

impl FrameKind {
    /// The wire tag for this frame kind
    pub const fn packet_type(self) -> PacketType {
        match self {
            FrameKind::Configuration => PacketType::Configuration,
            FrameKind::SpectrometerFrame => PacketType::SpectrometerFrame,
            FrameKind::OcrFrame => PacketType::OcrFrame,
            FrameKind::McomsFrame => PacketType::McomsFrame,
            FrameKind::ProfileInfo => PacketType::ProfileInfo,
            FrameKind::ProfileData => PacketType::ProfileData,
        }
    }

    /// Buffered kind for a wire tag, `None` for inline types
    pub const fn from_packet_type(kind: PacketType) -> Option<FrameKind> {
        match kind {
            PacketType::Configuration => Some(FrameKind::Configuration),
            PacketType::SpectrometerFrame => Some(FrameKind::SpectrometerFrame),
            PacketType::OcrFrame => Some(FrameKind::OcrFrame),
            PacketType::McomsFrame => Some(FrameKind::McomsFrame),
            PacketType::ProfileInfo => Some(FrameKind::ProfileInfo),
            PacketType::ProfileData => Some(FrameKind::ProfileData),
            _ => None,
        }
    }

    /// Payload byte count for this kind
    pub const fn payload_len(self) -> usize {
        self.packet_type().wire_payload_len()
    }
}

/// Command codes understood across the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum CommandCode {
    StartAcquisition = 1,
    StopAcquisition = 2,
    QueryStatus = 3,
    SetPowerMode = 4,
}

impl CommandCode {
    pub const fn from_u16(value: u16) -> Option<CommandCode> {
        match value {
            1 => Some(CommandCode::StartAcquisition),
            2 => Some(CommandCode::StopAcquisition),
            3 => Some(CommandCode::QueryStatus),
            4 => Some(CommandCode::SetPowerMode),
            _ => None,
        }
    }
}

/// Response codes understood across the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ResponseCode {
    /// Reply the exchange synthesizes for a `Ping`
    Ping = 1,
    Ack = 2,
    Nack = 3,
    Status = 4,
}

impl ResponseCode {
    pub const fn from_u16(value: u16) -> Option<ResponseCode> {
        match value {
            1 => Some(ResponseCode::Ping),
            2 => Some(ResponseCode::Ack),
            3 => Some(ResponseCode::Nack),
            4 => Some(ResponseCode::Status),
            _ => None,
        }
    }
}

/// Diagnostic event codes carried by `LogEvent` packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum EventCode {
    LinkFault = 1,
    Misaddressed = 2,
    QueueOverflow = 3,
    SlotReclaimed = 4,
}

impl EventCode {
    pub const fn from_u16(value: u16) -> Option<EventCode> {
        match value {
            1 => Some(EventCode::LinkFault),
            2 => Some(EventCode::Misaddressed),
            3 => Some(EventCode::QueueOverflow),
            4 => Some(EventCode::SlotReclaimed),
            _ => None,
        }
    }
}

/// Inline command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandValue {
    pub code: CommandCode,
    pub arg: u32,
}

/// Inline response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseValue {
    pub code: ResponseCode,
    pub value: u32,
}

/// Inline diagnostic payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventValue {
    pub code: EventCode,
    pub detail: u32,
}

/// Payload of a packet; the variant determines the wire type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketPayload {
    None,
    Ping,
    Command(CommandValue),
    Response(ResponseValue),
    LogEvent(EventValue),
    Frame { kind: FrameKind, slot: SlotId },
}

/// Addressed unit of exchange between firmware tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    pub to: NodeId,
    pub from: NodeId,
    pub payload: PacketPayload,
}

impl Packet {
    /// Bare addressed packet with no payload
    pub const fn addressed(to: NodeId, from: NodeId) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::None,
        }
    }

    /// Liveness probe; the receiving exchange answers it itself
    pub const fn ping(to: NodeId, from: NodeId) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::Ping,
        }
    }

    pub const fn command(to: NodeId, from: NodeId, value: CommandValue) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::Command(value),
        }
    }

    pub const fn response(to: NodeId, from: NodeId, value: ResponseValue) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::Response(value),
        }
    }

    pub const fn log_event(to: NodeId, from: NodeId, value: EventValue) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::LogEvent(value),
        }
    }

    /// Bulk packet referencing a filled pool slot
    pub const fn frame(to: NodeId, from: NodeId, kind: FrameKind, slot: SlotId) -> Self {
        Self {
            to,
            from,
            payload: PacketPayload::Frame { kind, slot },
        }
    }

    /// Wire type tag, derived from the payload variant
    pub const fn kind(&self) -> PacketType {
        match self.payload {
            PacketPayload::None => PacketType::Nothing,
            PacketPayload::Ping => PacketType::Ping,
            PacketPayload::Command(_) => PacketType::Command,
            PacketPayload::Response(_) => PacketType::Response,
            PacketPayload::LogEvent(_) => PacketType::LogEvent,
            PacketPayload::Frame { kind, .. } => kind.packet_type(),
        }
    }

    /// Attached pool slot, if the payload is buffered
    pub const fn slot(&self) -> Option<SlotId> {
        match self.payload {
            PacketPayload::Frame { slot, .. } => Some(slot),
            _ => None,
        }
    }
}
