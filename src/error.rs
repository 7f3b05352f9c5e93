//! # Error Types
//!
//! Error handling for the Dominion bridge.
//!
//! This module defines every error variant that can occur while talking to a
//! heating controller, from transport failures on the secure channel up to
//! discovery and command routing problems.
//!
//! ## Error Categories
//! - **Transport Errors**: connect/send/receive failures, closed channels, timeouts.
//!   The connection manager recovers from these on its own.
//! - **Framing Errors**: a packet header declares more bytes than the read holds.
//!   Logged and contained; never fatal.
//! - **Discovery Errors**: pairing rejected, pairing/transfer failure, empty payload.
//!   These are the only errors surfaced to a caller.
//! - **Command Errors**: unknown command kinds and room numbers. Logged and ignored.
//!
//! ## Example Usage
//! ```rust
//! use dominion_bridge::error::{BridgeError, Result};
//! use dominion_bridge::transport::PeerId;
//!
//! fn parse(input: &str) -> Result<PeerId> {
//!     input.parse::<PeerId>()
//! }
//!
//! match parse("not-a-key") {
//!     Err(BridgeError::InvalidPeerId(_)) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Offline reasons reported by the connection manager
    pub const REASON_PEER_NOT_CONNECTED: &str = "Peer not connected";
    pub const REASON_COMMUNICATION_TIMEOUT: &str = "Communication timeout";

    /// Discovery errors
    pub const ERR_PAIRING_REJECTED: &str = "Connection refused by peer; likely wrong OTP";
    pub const ERR_NO_DATA: &str = "No data received";

    /// Channel errors
    pub const ERR_CHANNEL_NOT_OPEN: &str = "Secure channel is not open";
    pub const ERR_CHANNEL_ALREADY_OPEN: &str = "Secure channel is already open";
    pub const ERR_RENDEZVOUS_EMPTY: &str = "No rendezvous endpoints configured";
}

/// BridgeError is the primary error type for all bridge operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection refused by peer: {0}")]
    PeerRefused(String),

    #[error("Pairing rejected: {}", constants::ERR_PAIRING_REJECTED)]
    PairingRejected,

    #[error("Pairing failed: {0}")]
    PairingFailed(String),

    #[error("Failed to receive configuration: {0}")]
    TransferFailed(String),

    #[error("{}", constants::ERR_NO_DATA)]
    NoDataReceived,

    #[error("Malformed data at offset {offset}: packet declares {declared} bytes, {available} available")]
    Framing {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("Payload too short for code {code:#06x}: need {needed} bytes, have {available}")]
    ShortPayload {
        code: u16,
        needed: usize,
        available: usize,
    },

    #[error("Payload of {len} bytes exceeds the {max}-byte packet limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid setpoint: {0}")]
    InvalidSetpoint(f64),

    #[error("Invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown room: {0}")]
    UnknownRoom(u8),
}

impl BridgeError {
    /// Human-readable reason used when the link drops.
    pub fn offline_reason(&self) -> String {
        match self {
            BridgeError::ConnectionClosed => constants::REASON_PEER_NOT_CONNECTED.to_string(),
            BridgeError::Timeout => constants::REASON_COMMUNICATION_TIMEOUT.to_string(),
            other => other.to_string(),
        }
    }
}

/// Type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_reason_names_closed_and_timeout() {
        assert_eq!(
            BridgeError::ConnectionClosed.offline_reason(),
            "Peer not connected"
        );
        assert_eq!(BridgeError::Timeout.offline_reason(), "Communication timeout");
        assert_eq!(
            BridgeError::TransportError("socket reset".into()).offline_reason(),
            "Transport error: socket reset"
        );
    }
}
