//! Packet Exchange Protocol
//!
//! This module implements the addressed packet transport between the
//! instrument's two boards. Firmware tasks on either board post packets
//! to per-node mailboxes; one exchange task per board moves the
//! cross-board traffic over a shared serial bus guarded by a pair of
//! GPIO indicator lines.
//!
//! # Architecture
//!
//! - **Node**: Addressing space; every queue endpoint on both boards
//! - **Packet**: Address pair plus an inline value or a buffer slot
//! - **Wire**: Frame layout, handshake tokens, and status codes
//! - **Pool**: Fixed slab of payload slots shared between producers and
//!   the exchange
//! - **Mailbox**: Per-node bounded FIFO queues
//! - **Router**: Board-local delivery and cross-board forwarding
//! - **Link**: Stepped frame transfer engine over the bus
//! - **Task**: Per-board service loop tying the pieces together
//!
//! # Usage
//!
//! ```ignore
//! use hydrospec::communication::exchange::{
//!     Board, BufferPool, ExchangeConfig, ExchangeTask, MailboxBank, TaskControl,
//! };
//!
//! static BANK: MailboxBank = MailboxBank::new(Board::Controller);
//! static POOL: BufferPool = BufferPool::new();
//! static CONTROL: TaskControl = TaskControl::new();
//!
//! let mut task = ExchangeTask::new(
//!     Board::Controller,
//!     driver,
//!     &BANK,
//!     &POOL,
//!     &CONTROL,
//!     ExchangeConfig::default(),
//! );
//! loop {
//!     task.service_once();
//! }
//! ```

pub mod link; // Stepped link frame engine
pub mod mailbox; // Per-node packet queues
pub mod node; // Board and node addressing
pub mod packet; // Packet model and payload codes
pub mod pool; // Shared payload buffer pool
pub mod router; // Board-local packet routing
pub mod task; // Per-board exchange service task
pub mod wire; // Frame layout and handshake tokens

pub use link::{LinkConfig, LinkDriver, LinkError, LinkEvent, LinkFault};
pub use mailbox::{MAILBOX_DEPTH, Mailbox, MailboxBank};
pub use node::{ALL_NODES, Board, NODE_COUNT, NodeId};
pub use packet::{
    CommandCode, CommandValue, EventCode, EventValue, FrameKind, Packet, PacketPayload,
    PacketType, ResponseCode, ResponseValue,
};
pub use pool::{
    BufferPool, FAST_SLOT_COUNT, MemoryClass, PoolError, SLOT_CAPACITY, SLOT_COUNT,
    SLOW_SLOT_COUNT, SlotId,
};
pub use router::{RouteError, route};
pub use task::{
    ExchangeConfig, ExchangeEvent, ExchangeStats, ExchangeTask, TaskControl,
};
