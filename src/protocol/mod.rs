//! # Dominion Protocol Layer
//!
//! Everything above the byte level: the connection lifecycle, the house and
//! room state machines fed by decoded packets, console commands and the
//! one-shot discovery flow.
//!
//! ## Components
//! - **Connection**: connect, watchdog and fixed-delay reconnect for one link
//! - **Master / Room**: per-entity state behind a fair reader-writer lock
//! - **Codes**: message classes and codes
//! - **Command**: JSON command lines routed to room setpoints
//! - **Discovery**: pairing by one-time code and configuration transfer

pub mod codes;
pub mod command;
pub mod connection;
pub mod discovery;
pub mod master;
pub mod room;
pub mod state;

use crate::core::packet::Packet;

/// Consumer of decoded packets for one link
pub trait PacketHandler: Send + Sync {
    /// Apply one packet; runs on the receive path and must not block
    fn handle_packet(&self, packet: &Packet);

    /// Send a keep-alive probe
    fn ping(&self);

    /// The link to the controller was (re)established
    fn on_connected(&self) {}
}
