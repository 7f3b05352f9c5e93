//! Secure channel adapter.
//!
//! Bridges a [`SecureChannel`] to the connection manager: a reader task turns
//! every read into packets via [`demux`] and a writer task drains outbound
//! frames in order. Each attached channel is a *link* with its own id, so
//! failures reported by a link that has since been replaced are ignored.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::codec::demux;
use crate::core::packet::Packet;
use crate::error::BridgeError;
use crate::transport::{ConnectionState, SecureChannel};
use crate::utils::metrics::LinkMetrics;
use crate::utils::timeout::with_timeout_error;

/// Receiver of link events
pub trait LinkListener: Send + Sync {
    /// A packet was decoded from the current link
    fn on_packet(&self, packet: Packet);

    /// Link `link_id` failed while it was the attached one
    fn on_link_error(&self, link_id: u64, error: BridgeError);
}

struct Link {
    id: u64,
    channel: Arc<dyn SecureChannel>,
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
}

/// Adapter owning the currently attached secure channel
pub struct SecureChannelAdapter {
    listener: Weak<dyn LinkListener>,
    metrics: Arc<LinkMetrics>,
    send_timeout: Duration,
    link: Mutex<Option<Link>>,
    next_id: AtomicU64,
}

impl SecureChannelAdapter {
    pub fn new(
        listener: Weak<dyn LinkListener>,
        metrics: Arc<LinkMetrics>,
        send_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            listener,
            metrics,
            send_timeout,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Attach an open channel and start receiving from it.
    ///
    /// Any previously attached link is cancelled without being closed; call
    /// [`detach`](Self::detach) first to close it.
    pub fn attach(self: &Arc<Self>, channel: Arc<dyn SecureChannel>, runtime: &Handle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (outbound, rx) = mpsc::unbounded_channel();

        runtime.spawn(read_loop(
            Arc::downgrade(self),
            id,
            channel.clone(),
            cancel.clone(),
        ));
        runtime.spawn(write_loop(
            channel.clone(),
            rx,
            cancel.clone(),
            self.metrics.clone(),
            self.send_timeout,
        ));

        let previous = self.link.lock().replace(Link {
            id,
            channel,
            outbound,
            cancel,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        debug!(link = id, "Secure channel attached");
        id
    }

    /// Stop the current link and close its channel
    pub async fn detach(&self) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            // Cancel first so the reader exits without reporting the close
            link.cancel.cancel();
            link.channel.close().await;
            debug!(link = link.id, "Secure channel detached");
        }
    }

    /// State of the attached channel
    pub fn state(&self) -> ConnectionState {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.channel.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Id of the attached link, if any
    pub fn link_id(&self) -> Option<u64> {
        self.link.lock().as_ref().map(|link| link.id)
    }

    /// Queue a frame on the attached link.
    ///
    /// Returns `false` when there is no connected link to carry it.
    pub fn send(&self, data: Bytes) -> bool {
        let link = self.link.lock();
        match link.as_ref() {
            Some(link) if link.channel.state() == ConnectionState::Connected => {
                link.outbound.send(data).is_ok()
            }
            _ => false,
        }
    }

    /// Split a read into packets and forward them in order
    pub fn on_data_received(&self, data: &[u8]) {
        self.metrics.read_received(data.len() as u64);
        let out = demux(data);

        if let Some(listener) = self.listener.upgrade() {
            for packet in out.packets {
                listener.on_packet(packet);
            }
        }

        if let Some(error) = out.malformed {
            self.metrics.malformed_read();
            warn!(error = %error, discarded = out.discarded, "Malformed data; dropping rest of read");
            debug!(data = %hex::encode(data), "Malformed read");
        } else if out.discarded > 0 {
            trace!(discarded = out.discarded, "Ignoring short tail of read");
        }
    }

    /// Forward a failure of link `link_id` if it is still the attached one
    pub fn on_error(&self, link_id: u64, error: BridgeError) {
        if self.link_id() != Some(link_id) {
            debug!(link = link_id, error = %error, "Ignoring error from stale link");
            return;
        }
        if let Some(listener) = self.listener.upgrade() {
            listener.on_link_error(link_id, error);
        }
    }
}

impl Drop for SecureChannelAdapter {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.cancel.cancel();
        }
    }
}

async fn read_loop(
    adapter: Weak<SecureChannelAdapter>,
    id: u64,
    channel: Arc<dyn SecureChannel>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = channel.receive() => {
                let Some(adapter) = adapter.upgrade() else { break };
                match read {
                    Ok(data) => adapter.on_data_received(&data),
                    Err(error) => {
                        adapter.on_error(id, error);
                        break;
                    }
                }
            }
        }
    }
    trace!(link = id, "Reader finished");
}

async fn write_loop(
    channel: Arc<dyn SecureChannel>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
    metrics: Arc<LinkMetrics>,
    send_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => {
                let Some(data) = next else { break };
                match with_timeout_error(channel.send(data), send_timeout).await {
                    Ok(()) => metrics.frame_sent(),
                    Err(error) => {
                        metrics.send_failed();
                        warn!(error = %error, "Failed to send data");
                    }
                }
            }
        }
    }
}
