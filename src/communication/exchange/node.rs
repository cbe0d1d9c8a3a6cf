//! Node identities and board topology
//!
//! Every firmware task that takes part in packet exchange has a fixed
//! `NodeId`. The id is both the wire address byte and the index of the
//! node's mailbox, so the numbering is part of the inter-board protocol
//! and must not change between firmware revisions.

/// Board a node lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Board {
    Controller,
    Spectrometer,
}

impl Board {
    /// The exchange node serving this board's end of the link
    pub const fn exchange_node(self) -> NodeId {
        match self {
            Board::Controller => NodeId::ControllerExchange,
            Board::Spectrometer => NodeId::SpectrometerExchange,
        }
    }
}

/// Fixed address of a firmware task in the exchange fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NodeId {
    /// Sentinel address; packets sent here are discarded unrouted
    Nobody = 0,
    /// Command interpreter (controller)
    Commander = 1,
    /// Streaming log writer (controller)
    StreamLog = 2,
    /// Auxiliary sensor acquisition (controller)
    AuxAcquisition = 3,
    /// Profile scheduling and bookkeeping (controller)
    ProfileManager = 4,
    /// Link endpoint on the controller board
    ControllerExchange = 5,
    /// Spectrometer frame acquisition (spectrometer)
    DataAcquisition = 6,
    /// On-board profile processing (spectrometer)
    ProfileProcessor = 7,
    /// Link endpoint on the spectrometer board
    SpectrometerExchange = 8,
}

/// Number of node ids, sentinel included (mailbox array length)
pub const NODE_COUNT: usize = 9;

/// Every id in discriminant order
pub const ALL_NODES: [NodeId; NODE_COUNT] = [
    NodeId::Nobody,
    NodeId::Commander,
    NodeId::StreamLog,
    NodeId::AuxAcquisition,
    NodeId::ProfileManager,
    NodeId::ControllerExchange,
    NodeId::DataAcquisition,
    NodeId::ProfileProcessor,
    NodeId::SpectrometerExchange,
];

impl NodeId {
    /// Decode a wire address byte
    pub const fn from_u8(value: u8) -> Option<NodeId> {
        match value {
            0 => Some(NodeId::Nobody),
            1 => Some(NodeId::Commander),
            2 => Some(NodeId::StreamLog),
            3 => Some(NodeId::AuxAcquisition),
            4 => Some(NodeId::ProfileManager),
            5 => Some(NodeId::ControllerExchange),
            6 => Some(NodeId::DataAcquisition),
            7 => Some(NodeId::ProfileProcessor),
            8 => Some(NodeId::SpectrometerExchange),
            _ => None,
        }
    }

    /// Mailbox array index for this id
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Board this node runs on (`None` for the sentinel)
    ///
    /// This map is the single source of truth for routing decisions.
    pub const fn board(self) -> Option<Board> {
        match self {
            NodeId::Nobody => None,
            NodeId::Commander
            | NodeId::StreamLog
            | NodeId::AuxAcquisition
            | NodeId::ProfileManager
            | NodeId::ControllerExchange => Some(Board::Controller),
            NodeId::DataAcquisition | NodeId::ProfileProcessor | NodeId::SpectrometerExchange => {
                Some(Board::Spectrometer)
            }
        }
    }
}
