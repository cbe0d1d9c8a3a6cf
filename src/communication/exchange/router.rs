//! Board-local packet routing
//!
//! `route` is the single entry point producers use to send a packet. It
//! only ever touches mailboxes on the calling board: a packet for a local
//! node lands in that node's mailbox, a packet for the other board lands
//! in the local exchange's mailbox for transport. Routing never blocks
//! and never touches the link.

use super::mailbox::MailboxBank;
use super::node::NodeId;
use super::packet::Packet;

/// Routing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteError {
    /// Destination queue is full; the packet was not admitted
    QueueFull(NodeId),
    /// The exchange tried to route a packet for the other board to itself
    ExchangeRecursion,
}

impl core::fmt::Display for RouteError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RouteError::QueueFull(node) => write!(f, "queue full for node {}", *node as u8),
            RouteError::ExchangeRecursion => write!(f, "exchange routed to itself"),
        }
    }
}

/// Deliver a packet on behalf of `current`
///
/// A packet to `Nobody`, or sent by `Nobody`, is discarded silently. A
/// full queue is the caller's backpressure signal; the packet is not
/// admitted anywhere.
pub fn route(bank: &MailboxBank, current: NodeId, packet: Packet) -> Result<(), RouteError> {
    let Some(dest_board) = packet.to.board() else {
        return Ok(());
    };
    if current == NodeId::Nobody {
        return Ok(());
    }

    if dest_board == bank.board() {
        return bank
            .mailbox(packet.to)
            .push(packet)
            .map_err(|_| RouteError::QueueFull(packet.to));
    }

    // Off-board: hand to the local exchange for transport. The exchange
    // itself must never end up here with an off-board packet.
    let exchange = bank.board().exchange_node();
    if current == exchange {
        debug_assert!(false, "exchange routed an off-board packet to itself");
        return Err(RouteError::ExchangeRecursion);
    }
    bank.mailbox(exchange)
        .push(packet)
        .map_err(|_| RouteError::QueueFull(exchange))
}
