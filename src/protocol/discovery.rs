//! # Discovery
//!
//! One-shot pairing with a new house controller.
//!
//! 1. Connect to the rendezvous service and pair using the one-time code.
//! 2. Open a session to the paired peer on the configuration protocol and send
//!    `{"userName", "peerIdentifier"}`.
//! 3. Read the JSON answer, which either arrives whole or as a chunked transfer:
//!
//! ```text
//! first read:  [0u32 marker] [total u32 LE] [first chunk ...]
//! later reads: [chunk ...] until total bytes are assembled
//! ```
//!
//! A first read that does not start with the zero marker is the whole payload.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::DiscoveryConfig;
use crate::error::{BridgeError, Result};
use crate::transport::{
    ChannelFactory, PeerId, SecureChannel, DOMINION_CONFIGURATION_PROTOCOL,
};
use crate::utils::timeout::with_timeout_error;

/// Size of the chunked-transfer header
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Strip separators users type into one-time codes
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Reassembles the configuration payload from successive reads
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    total: Option<usize>,
    data: BytesMut,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read; returns `true` once the payload is complete.
    pub fn push(&mut self, read: &[u8]) -> bool {
        match self.total {
            None => {
                let chunked = read.len() > CHUNK_HEADER_SIZE && read[..4] == [0, 0, 0, 0];
                if chunked {
                    let total = u32::from_le_bytes([read[4], read[5], read[6], read[7]]) as usize;
                    debug!(total, "Chunked transfer");
                    self.total = Some(total);
                    self.append(&read[CHUNK_HEADER_SIZE..]);
                } else {
                    self.total = Some(read.len());
                    self.data.extend_from_slice(read);
                }
            }
            Some(_) => self.append(read),
        }
        self.is_complete()
    }

    fn append(&mut self, chunk: &[u8]) {
        let remaining = self.remaining();
        if chunk.len() > remaining {
            warn!(extra = chunk.len() - remaining, "Dropping bytes past declared total");
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
    }

    /// Declared or implied payload size, once the first read arrived
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.total.unwrap_or(0).saturating_sub(self.data.len())
    }

    pub fn is_complete(&self) -> bool {
        self.total.is_some() && self.remaining() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

/// Configuration request sent to the paired controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub user_name: String,
    pub peer_identifier: String,
}

/// A room reported by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredRoom {
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub peer_id: String,
}

/// Configuration returned by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub house_peer_id: Option<String>,
    #[serde(default)]
    pub house_name: String,
    #[serde(default)]
    pub rooms: Vec<DiscoveredRoom>,
}

impl DiscoveryResponse {
    /// Identifier of the house controller, when the response carried one
    pub fn house_peer_id(&self) -> Option<&str> {
        self.house_peer_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Pairing and configuration transfer against one rendezvous service
pub struct DiscoveryFlow {
    factory: Arc<dyn ChannelFactory>,
    config: DiscoveryConfig,
}

impl DiscoveryFlow {
    pub fn new(factory: Arc<dyn ChannelFactory>, config: DiscoveryConfig) -> Self {
        Self { factory, config }
    }

    /// Pair with `one_time_code` and fetch the house configuration
    #[instrument(skip(self, one_time_code))]
    pub async fn discover(&self, user_name: &str, one_time_code: &str) -> Result<DiscoveryResponse> {
        let local = self.factory.local_peer_id();
        let peer = self.pair(&normalize_code(one_time_code)).await?;
        info!(%peer, "Paired with controller");

        let payload = self.fetch_configuration(&peer, user_name, &local).await?;
        let response: DiscoveryResponse = serde_json::from_slice(&payload)?;

        match response.house_peer_id() {
            Some(house) => info!(house, name = %response.house_name, "Received house controller"),
            None => warn!(name = %response.house_name, "Configuration carries no house peer id"),
        }
        Ok(response)
    }

    async fn pair(&self, code: &str) -> Result<PeerId> {
        let channel = self.factory.create();
        let attempt = async {
            channel.connect(&self.config.rendezvous).await?;
            debug!("Connected to rendezvous");
            channel.pair_with_code(code).await
        };
        let paired = with_timeout_error(attempt, self.config.pairing_timeout).await;
        channel.close().await;

        paired.map_err(|e| match e {
            BridgeError::PeerRefused(reason) => {
                warn!(%reason, "Pairing refused by peer");
                BridgeError::PairingRejected
            }
            other => BridgeError::PairingFailed(other.to_string()),
        })
    }

    async fn fetch_configuration(
        &self,
        peer: &PeerId,
        user_name: &str,
        local: &PeerId,
    ) -> Result<Bytes> {
        let channel = self.factory.create();
        let fetched = self.transfer(channel.as_ref(), peer, user_name, local).await;
        channel.close().await;

        let payload = fetched.map_err(|e| match e {
            BridgeError::NoDataReceived | BridgeError::Json(_) => e,
            other => BridgeError::TransferFailed(other.to_string()),
        })?;
        if payload.is_empty() {
            return Err(BridgeError::NoDataReceived);
        }
        Ok(payload)
    }

    async fn transfer(
        &self,
        channel: &dyn SecureChannel,
        peer: &PeerId,
        user_name: &str,
        local: &PeerId,
    ) -> Result<Bytes> {
        with_timeout_error(
            async {
                channel.connect(&self.config.rendezvous).await?;
                channel
                    .connect_to_remote(peer, DOMINION_CONFIGURATION_PROTOCOL)
                    .await
            },
            self.config.pairing_timeout,
        )
        .await?;

        let request = DiscoveryRequest {
            user_name: user_name.to_string(),
            peer_identifier: local.to_hex(),
        };
        channel.send(Bytes::from(serde_json::to_vec(&request)?)).await?;

        let mut assembler = ChunkAssembler::new();
        loop {
            let read = with_timeout_error(channel.receive(), self.config.read_timeout).await?;
            let complete = assembler.push(&read);
            let total = assembler.total().unwrap_or(0);
            if total > self.config.max_payload_size {
                return Err(BridgeError::TransferFailed(format!(
                    "configuration of {} bytes exceeds limit of {}",
                    total, self.config.max_payload_size
                )));
            }
            if complete {
                break;
            }
        }
        Ok(assembler.into_bytes())
    }
}
