//! Per-node packet mailboxes
//!
//! Every node owns one bounded FIFO of packets. A board holds its nodes'
//! mailboxes in a `MailboxBank`, indexed by `NodeId`, which is the only
//! shared-state surface between producers, consumers, and the exchange.
//! Push never blocks; a full queue hands the packet back to the caller.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use super::node::{Board, NODE_COUNT, NodeId};
use super::packet::Packet;

/// Packets a single mailbox can hold
pub const MAILBOX_DEPTH: usize = 8;

/// Bounded FIFO of packets for one node
pub struct Mailbox {
    queue: Mutex<RefCell<Deque<Packet, MAILBOX_DEPTH>>>,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Append a packet; a full queue returns it to the caller
    pub fn push(&self, packet: Packet) -> Result<(), Packet> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).push_back(packet))
    }

    /// Put a packet back at the head (retry without reordering)
    pub fn push_front(&self, packet: Packet) -> Result<(), Packet> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).push_front(packet))
    }

    /// Take the oldest packet
    pub fn pop(&self) -> Option<Packet> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.queue.borrow_ref(cs).is_empty())
    }

    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.queue.borrow_ref(cs).is_full())
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// All mailboxes of one board, indexed by `NodeId`
///
/// The bank carries every id's mailbox, including nodes that live on the
/// other board; only the local ones are ever popped. That keeps indexing
/// total and the router free of board-shape special cases.
pub struct MailboxBank {
    board: Board,
    boxes: [Mailbox; NODE_COUNT],
}

impl MailboxBank {
    pub const fn new(board: Board) -> Self {
        Self {
            board,
            boxes: [
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
                Mailbox::new(),
            ],
        }
    }

    /// Board this bank belongs to
    pub fn board(&self) -> Board {
        self.board
    }

    /// Mailbox of a node
    pub fn mailbox(&self, node: NodeId) -> &Mailbox {
        &self.boxes[node.index()]
    }
}
