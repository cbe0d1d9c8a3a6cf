//! Communication Protocols
//!
//! This module provides the inter-board communication stack for the
//! instrument, centered on the packet exchange protocol that links the
//! controller and spectrometer boards.
//!
//! # Protocols
//!
//! - **Packet Exchange**: Addressed packet transport between firmware tasks
//!   - Per-node mailboxes and board-local routing
//!   - Shared buffer pool for bulk payloads
//!   - Synchronized frame transfer over the inter-board bus
//!
//! # Transport Layers
//!
//! - Inter-board serial bus plus two GPIO indicator lines

pub mod exchange;
