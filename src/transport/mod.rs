//! # Transport Layer
//!
//! The secure peer-to-peer channel is supplied from outside the crate. This
//! module defines the contract it must satisfy, the identifiers it works with,
//! and the adapter that turns its byte reads into Dominion packets.
//!
//! ## Components
//! - **SecureChannel**: rendezvous, pairing and point-to-point session contract
//! - **ChannelFactory**: mints fresh channels bound to the local identity
//! - **Adapter**: demultiplexes reads and forwards packets and failures
//! - **Loopback**: in-process channel with a scriptable remote side

pub mod adapter;
pub mod loopback;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Application protocol spoken to the controller in steady state
pub const DOMINION_PROTOCOL: &str = "dominion-1.0";

/// Application protocol used to fetch the house configuration during discovery
pub const DOMINION_CONFIGURATION_PROTOCOL: &str = "dominion-configuration-1.0";

/// Length of a peer identifier (a curve25519 public key)
pub const PEER_ID_LEN: usize = 32;

/// Connection state of a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Identifier of a peer on the secure grid
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PeerId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| BridgeError::InvalidPeerId(format!("{s:?}: {e}")))?;
        let key: [u8; PEER_ID_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            BridgeError::InvalidPeerId(format!(
                "expected {PEER_ID_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(key))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}

/// Encrypted peer-to-peer channel.
///
/// Implementations own the cryptography and the rendezvous protocol; the
/// bridge only drives the lifecycle and moves bytes. A channel instance is
/// used for one session and then closed.
#[async_trait]
pub trait SecureChannel: Send + Sync {
    /// Open a session with the rendezvous service, trying `endpoints` in order
    async fn connect(&self, endpoints: &[String]) -> Result<()>;

    /// Pair with a new peer using a one-time code; returns the peer's identifier.
    ///
    /// A peer that refuses the code reports [`BridgeError::PeerRefused`].
    async fn pair_with_code(&self, code: &str) -> Result<PeerId>;

    /// Establish a point-to-point session with `peer` for `protocol`
    async fn connect_to_remote(&self, peer: &PeerId, protocol: &str) -> Result<()>;

    /// Send one application message
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Wait for the next read; may hold several application messages
    async fn receive(&self) -> Result<Bytes>;

    /// Close the channel; pending and future receives fail
    async fn close(&self);

    fn state(&self) -> ConnectionState;
}

/// Source of fresh secure channels bound to the local identity
pub trait ChannelFactory: Send + Sync {
    /// Identity presented to peers
    fn local_peer_id(&self) -> PeerId;

    fn create(&self) -> Arc<dyn SecureChannel>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_round_trips_through_hex() {
        let text = "00112233445566778899AABBCCDDEEFF00112233445566778899aabbccddeeff";
        let peer: PeerId = text.parse().unwrap();
        assert_eq!(peer.to_string(), text.to_lowercase());
        assert_eq!(peer.as_bytes()[10], 0xAA);
    }

    #[test]
    fn peer_id_rejects_wrong_length_and_garbage() {
        assert!(matches!(
            "0011".parse::<PeerId>(),
            Err(BridgeError::InvalidPeerId(_))
        ));
        assert!(matches!(
            "zz".repeat(32).parse::<PeerId>(),
            Err(BridgeError::InvalidPeerId(_))
        ));
        assert!("".parse::<PeerId>().is_err());
    }
}
