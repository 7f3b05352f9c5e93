//! In-process secure channel.
//!
//! [`LoopbackNetwork`] is a [`ChannelFactory`] whose remote side is scripted
//! by the caller: pairing outcome, connect failures, reads to deliver once a
//! session with the remote peer is up. Every channel it creates is kept so the
//! caller can inject reads and errors or inspect what was sent.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{constants, BridgeError, Result};
use crate::transport::{ChannelFactory, ConnectionState, PeerId, SecureChannel};

/// How the remote side answers a pairing code
#[derive(Debug, Clone)]
pub enum PairingOutcome {
    /// Accept and report this peer id
    Accept(PeerId),
    /// Refuse the code
    Refuse,
    /// Fail with a transport error
    Fail(String),
    /// Never answer
    Hang,
}

#[derive(Debug)]
struct RemoteScript {
    pairing: PairingOutcome,
    failing_connects: usize,
    hang_connects: bool,
    reads_on_connect: Vec<Bytes>,
    close_after_reads: bool,
    pairing_codes: Vec<String>,
}

/// Factory of loopback channels sharing one scripted remote side
pub struct LoopbackNetwork {
    local: PeerId,
    script: Arc<Mutex<RemoteScript>>,
    channels: Mutex<Vec<Arc<LoopbackChannel>>>,
}

impl LoopbackNetwork {
    pub fn new(local: PeerId) -> Arc<Self> {
        Arc::new(Self {
            local,
            script: Arc::new(Mutex::new(RemoteScript {
                pairing: PairingOutcome::Refuse,
                failing_connects: 0,
                hang_connects: false,
                reads_on_connect: Vec::new(),
                close_after_reads: false,
                pairing_codes: Vec::new(),
            })),
            channels: Mutex::new(Vec::new()),
        })
    }

    pub fn set_pairing(&self, outcome: PairingOutcome) {
        self.script.lock().pairing = outcome;
    }

    /// Make the next `count` rendezvous connects fail
    pub fn fail_next_connects(&self, count: usize) {
        self.script.lock().failing_connects = count;
    }

    /// Make rendezvous connects never complete
    pub fn hang_connects(&self, hang: bool) {
        self.script.lock().hang_connects = hang;
    }

    /// Reads delivered to the next channel that reaches the remote peer
    pub fn queue_reads_on_connect(&self, reads: impl IntoIterator<Item = Bytes>) {
        self.script.lock().reads_on_connect.extend(reads);
    }

    /// Close the session once the queued reads are delivered
    pub fn close_after_reads(&self, close: bool) {
        self.script.lock().close_after_reads = close;
    }

    /// Codes presented for pairing, in order
    pub fn pairing_codes(&self) -> Vec<String> {
        self.script.lock().pairing_codes.clone()
    }

    pub fn channels_created(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn channel(&self, index: usize) -> Option<Arc<LoopbackChannel>> {
        self.channels.lock().get(index).cloned()
    }

    /// Most recently created channel
    pub fn latest(&self) -> Option<Arc<LoopbackChannel>> {
        self.channels.lock().last().cloned()
    }
}

impl ChannelFactory for LoopbackNetwork {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn create(&self) -> Arc<dyn SecureChannel> {
        let channel = Arc::new(LoopbackChannel::new(self.script.clone()));
        self.channels.lock().push(channel.clone());
        channel
    }
}

/// One loopback session
pub struct LoopbackChannel {
    script: Arc<Mutex<RemoteScript>>,
    state: Mutex<ConnectionState>,
    remote: Mutex<Option<(PeerId, String)>>,
    sent: Mutex<Vec<Bytes>>,
    inbound_tx: mpsc::UnboundedSender<Result<Bytes>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Bytes>>>,
    closed: CancellationToken,
}

impl LoopbackChannel {
    fn new(script: Arc<Mutex<RemoteScript>>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            script,
            state: Mutex::new(ConnectionState::Disconnected),
            remote: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: CancellationToken::new(),
        }
    }

    /// Hand a read to the local side
    pub fn deliver(&self, data: impl Into<Bytes>) {
        let _ = self.inbound_tx.send(Ok(data.into()));
    }

    /// Fail the pending or next receive
    pub fn fail(&self, error: BridgeError) {
        let _ = self.inbound_tx.send(Err(error));
    }

    /// Frames sent by the local side, in order
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Peer and protocol of the point-to-point session, once established
    pub fn remote(&self) -> Option<(PeerId, String)> {
        self.remote.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.is_cancelled() || *self.state.lock() == ConnectionState::Disconnected {
            return Err(BridgeError::TransportError(
                constants::ERR_CHANNEL_NOT_OPEN.to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureChannel for LoopbackChannel {
    async fn connect(&self, endpoints: &[String]) -> Result<()> {
        if endpoints.is_empty() {
            return Err(BridgeError::TransportError(
                constants::ERR_RENDEZVOUS_EMPTY.to_string(),
            ));
        }
        if self.closed.is_cancelled() {
            return Err(BridgeError::ConnectionClosed);
        }
        if *self.state.lock() != ConnectionState::Disconnected {
            return Err(BridgeError::TransportError(
                constants::ERR_CHANNEL_ALREADY_OPEN.to_string(),
            ));
        }

        let hang = {
            let mut script = self.script.lock();
            if script.failing_connects > 0 {
                script.failing_connects -= 1;
                return Err(BridgeError::TransportError(format!(
                    "rendezvous {} unreachable",
                    endpoints[0]
                )));
            }
            script.hang_connects
        };
        if hang {
            self.closed.cancelled().await;
            return Err(BridgeError::ConnectionClosed);
        }

        *self.state.lock() = ConnectionState::Connecting;
        Ok(())
    }

    async fn pair_with_code(&self, code: &str) -> Result<PeerId> {
        self.ensure_open()?;
        let outcome = {
            let mut script = self.script.lock();
            script.pairing_codes.push(code.to_string());
            script.pairing.clone()
        };
        match outcome {
            PairingOutcome::Accept(peer) => Ok(peer),
            PairingOutcome::Refuse => Err(BridgeError::PeerRefused(format!(
                "code {code} not accepted"
            ))),
            PairingOutcome::Fail(reason) => Err(BridgeError::TransportError(reason)),
            PairingOutcome::Hang => {
                self.closed.cancelled().await;
                Err(BridgeError::ConnectionClosed)
            }
        }
    }

    async fn connect_to_remote(&self, peer: &PeerId, protocol: &str) -> Result<()> {
        self.ensure_open()?;
        *self.remote.lock() = Some((*peer, protocol.to_string()));
        *self.state.lock() = ConnectionState::Connected;

        let (reads, close) = {
            let mut script = self.script.lock();
            (
                std::mem::take(&mut script.reads_on_connect),
                script.close_after_reads,
            )
        };
        for read in reads {
            self.deliver(read);
        }
        if close {
            self.fail(BridgeError::ConnectionClosed);
        }
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::TransportError(
                constants::ERR_CHANNEL_NOT_OPEN.to_string(),
            ));
        }
        self.sent.lock().push(data);
        Ok(())
    }

    async fn receive(&self) -> Result<Bytes> {
        let mut inbound = self.inbound_rx.lock().await;
        let next = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(BridgeError::ConnectionClosed),
            next = inbound.recv() => next,
        };
        match next {
            Some(Ok(data)) => Ok(data),
            Some(Err(error)) => {
                *self.state.lock() = ConnectionState::Disconnected;
                Err(error)
            }
            None => Err(BridgeError::ConnectionClosed),
        }
    }

    async fn close(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
        self.closed.cancel();
    }

    fn state(&self) -> ConnectionState {
        if self.closed.is_cancelled() {
            return ConnectionState::Disconnected;
        }
        *self.state.lock()
    }
}
