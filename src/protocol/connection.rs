//! # Connection Lifecycle
//!
//! [`ConnectionManager`] keeps one secure link to a house controller alive.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (error) Disconnected -> (delay) Connecting ...
//! ```
//!
//! Connect, forced reconnect, link failure and dispose are queued to a single
//! worker task per manager, so they never interleave. A watchdog task checks the
//! time since the last received packet: past `ping_after` it asks the packet
//! handler for a keep-alive ping, past `reconnect_after` it forces a reconnect.
//! Reconnects always wait the same fixed delay.
//!
//! Sends are best effort. While the link is down they are dropped without any
//! signal to the caller.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ConnectionConfig;
use crate::core::packet::Packet;
use crate::error::BridgeError;
use crate::protocol::PacketHandler;
use crate::transport::adapter::{LinkListener, SecureChannelAdapter};
use crate::transport::{ChannelFactory, ConnectionState, PeerId, DOMINION_PROTOCOL};
use crate::utils::metrics::LinkMetrics;
use crate::utils::timeout::with_timeout_error;

/// Outcome of one watchdog check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Link is fresh or not connected
    Idle,
    /// Link has been quiet long enough to probe
    Ping,
    /// Link is considered dead
    Reconnect,
}

impl WatchdogAction {
    /// Action for a link that has been silent for `elapsed`
    pub fn evaluate(elapsed: Duration, ping_after: Duration, reconnect_after: Duration) -> Self {
        if elapsed > reconnect_after {
            WatchdogAction::Reconnect
        } else if elapsed > ping_after {
            WatchdogAction::Ping
        } else {
            WatchdogAction::Idle
        }
    }
}

enum LifecycleOp {
    Connect,
    ForceReconnect,
    LinkFailed { link: u64, error: BridgeError },
    Dispose(oneshot::Sender<()>),
}

/// Manager of the secure link to one house controller.
///
/// Cheap to clone; clones share the same link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    factory: Arc<dyn ChannelFactory>,
    handler: Weak<dyn PacketHandler>,
    runtime: Handle,
    adapter: OnceLock<Arc<SecureChannelAdapter>>,
    peer: OnceLock<PeerId>,
    state: watch::Sender<ConnectionState>,
    last_packet: Mutex<Instant>,
    disposed: AtomicBool,
    shutdown: CancellationToken,
    worker: Mutex<Option<mpsc::UnboundedSender<LifecycleOp>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<LinkMetrics>,
}

impl ConnectionManager {
    /// Create an idle manager.
    ///
    /// Packets are delivered to `handler`; tasks are spawned on `runtime`.
    pub fn new(
        factory: Arc<dyn ChannelFactory>,
        config: ConnectionConfig,
        handler: Weak<dyn PacketHandler>,
        runtime: Handle,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                handler,
                runtime,
                adapter: OnceLock::new(),
                peer: OnceLock::new(),
                state,
                last_packet: Mutex::new(Instant::now()),
                disposed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                worker: Mutex::new(None),
                reconnect: Mutex::new(None),
                watchdog: Mutex::new(None),
                metrics: Arc::new(LinkMetrics::new()),
            }),
        }
    }

    /// Start managing a link to `peer_identifier` (hex).
    ///
    /// A malformed identifier is logged and nothing is started. Only the first
    /// successful call has any effect.
    #[instrument(skip(self))]
    pub fn initialize(&self, peer_identifier: &str) {
        let peer = match peer_identifier.parse::<PeerId>() {
            Ok(peer) => peer,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed peer identifier");
                return;
            }
        };

        let inner = &self.inner;
        if inner.is_disposed() {
            warn!("Connection manager already disposed");
            return;
        }
        if inner.peer.set(peer).is_err() {
            warn!("Connection manager already initialized");
            return;
        }

        let listener: Weak<dyn LinkListener> = Arc::downgrade(inner) as Weak<dyn LinkListener>;
        let adapter = SecureChannelAdapter::new(
            listener,
            inner.metrics.clone(),
            inner.config.send_timeout,
        );
        let _ = inner.adapter.set(adapter);

        let (tx, rx) = mpsc::unbounded_channel();
        inner.runtime.spawn(run_worker(Arc::downgrade(inner), rx));
        *inner.worker.lock() = Some(tx);

        let period = inner.config.watchdog_interval;
        let watchdog = inner.runtime.spawn(run_watchdog(Arc::downgrade(inner), period));
        *inner.watchdog.lock() = Some(watchdog);

        info!(%peer, "Connection manager initialized");
        inner.enqueue(LifecycleOp::Connect);
    }

    /// Queue a packet for the controller; dropped when not connected
    pub fn send_packet(&self, packet: &Packet) {
        self.send(packet.to_bytes());
    }

    /// Queue raw bytes for the controller; dropped when not connected
    pub fn send(&self, data: Bytes) {
        let inner = &self.inner;
        if inner.state() != ConnectionState::Connected {
            inner.metrics.send_dropped();
            trace!(bytes = data.len(), "Not connected; dropping send");
            return;
        }
        let queued = inner
            .adapter
            .get()
            .map(|adapter| adapter.send(data))
            .unwrap_or(false);
        if !queued {
            inner.metrics.send_dropped();
        }
    }

    /// Run one watchdog check now.
    ///
    /// The periodic watchdog calls this; it is public so the outcome can be
    /// observed directly.
    pub fn check_watchdog(&self) -> WatchdogAction {
        self.inner.check_watchdog()
    }

    /// Stop the link for good. Idempotent.
    ///
    /// Runs on the lifecycle worker after any operation already in progress. A
    /// connect attempt still in flight is abandoned rather than awaited.
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            let (ack, done) = oneshot::channel();
            if worker.send(LifecycleOp::Dispose(ack)).is_ok() {
                let _ = done.await;
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Time since the last packet arrived (or since the last successful connect)
    pub fn last_packet_age(&self) -> Duration {
        self.inner.last_packet.lock().elapsed()
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.inner.peer.get().copied()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn metrics(&self) -> Arc<LinkMetrics> {
        self.inner.metrics.clone()
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn enqueue(&self, op: LifecycleOp) {
        let worker = self.worker.lock();
        match worker.as_ref() {
            Some(worker) => {
                let _ = worker.send(op);
            }
            None => trace!("Lifecycle worker gone; dropping operation"),
        }
    }

    async fn connect(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        let (Some(peer), Some(adapter)) = (self.peer.get().copied(), self.adapter.get().cloned())
        else {
            return;
        };
        if self.state() == ConnectionState::Connected {
            debug!("Already connected");
            return;
        }

        self.set_state(ConnectionState::Connecting);
        let channel = self.factory.create();
        let attempt = async {
            channel.connect(&self.config.rendezvous).await?;
            channel.connect_to_remote(&peer, DOMINION_PROTOCOL).await
        };

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = with_timeout_error(attempt, self.config.connect_timeout) => Some(result),
        };

        match outcome {
            None => {
                channel.close().await;
                debug!(%peer, "Connect abandoned on dispose");
            }
            Some(Ok(())) => {
                adapter.detach().await;
                *self.last_packet.lock() = Instant::now();
                self.set_state(ConnectionState::Connected);
                let link = adapter.attach(channel, &self.runtime);
                self.metrics.connect_succeeded();
                info!(%peer, link, "Connection established");
                if let Some(handler) = self.handler.upgrade() {
                    handler.on_connected();
                }
            }
            Some(Err(error)) => {
                channel.close().await;
                self.metrics.connect_failed();
                self.set_offline(&error);
            }
        }
    }

    async fn force_reconnect(self: &Arc<Self>) {
        if self.is_disposed() || self.state() != ConnectionState::Connected {
            return;
        }
        if let Some(adapter) = self.adapter.get() {
            adapter.detach().await;
        }
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    async fn link_failed(self: &Arc<Self>, link: u64, error: BridgeError) {
        let Some(adapter) = self.adapter.get() else {
            return;
        };
        if adapter.link_id() != Some(link) {
            debug!(link, "Failure of a replaced link");
            return;
        }
        adapter.detach().await;
        self.set_offline(&error);
    }

    fn set_offline(self: &Arc<Self>, error: &BridgeError) {
        let reason = error.offline_reason();
        warn!(peer = ?self.peer.get(), %reason, "Connection offline");
        self.set_state(ConnectionState::Disconnected);
        if !self.is_disposed() {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let delay = self.config.reconnect_delay;
        self.metrics.reconnect_scheduled();
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let weak = Arc::downgrade(self);
        let pending = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.enqueue(LifecycleOp::Connect);
            }
        });
        if let Some(previous) = self.reconnect.lock().replace(pending) {
            previous.abort();
        }
    }

    fn check_watchdog(&self) -> WatchdogAction {
        if self.is_disposed() || self.state() != ConnectionState::Connected {
            return WatchdogAction::Idle;
        }

        let elapsed = self.last_packet.lock().elapsed();
        let action =
            WatchdogAction::evaluate(elapsed, self.config.ping_after, self.config.reconnect_after);
        match action {
            WatchdogAction::Reconnect => {
                warn!(silent_ms = elapsed.as_millis() as u64, "Link silent; forcing reconnect");
                self.enqueue(LifecycleOp::ForceReconnect);
            }
            WatchdogAction::Ping => {
                debug!(silent_ms = elapsed.as_millis() as u64, "Link quiet; sending keep-alive");
                self.metrics.ping_sent();
                if let Some(handler) = self.handler.upgrade() {
                    handler.ping();
                }
            }
            WatchdogAction::Idle => {}
        }
        action
    }

    async fn shutdown(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        if let Some(pending) = self.reconnect.lock().take() {
            pending.abort();
        }
        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }
        if let Some(adapter) = self.adapter.get() {
            adapter.detach().await;
        }
        self.set_state(ConnectionState::Disconnected);
        info!(peer = ?self.peer.get(), "Connection manager disposed");
    }
}

impl LinkListener for Inner {
    fn on_packet(&self, packet: Packet) {
        *self.last_packet.lock() = Instant::now();
        self.metrics.packet_received();
        if let Some(handler) = self.handler.upgrade() {
            handler.handle_packet(&packet);
        }
    }

    fn on_link_error(&self, link_id: u64, error: BridgeError) {
        self.enqueue(LifecycleOp::LinkFailed {
            link: link_id,
            error,
        });
    }
}

async fn run_worker(inner: Weak<Inner>, mut ops: mpsc::UnboundedReceiver<LifecycleOp>) {
    while let Some(op) = ops.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match op {
            LifecycleOp::Connect => inner.connect().await,
            LifecycleOp::ForceReconnect => inner.force_reconnect().await,
            LifecycleOp::LinkFailed { link, error } => inner.link_failed(link, error).await,
            LifecycleOp::Dispose(ack) => {
                inner.shutdown().await;
                let _ = ack.send(());
                break;
            }
        }
    }
    trace!("Lifecycle worker finished");
}

async fn run_watchdog(inner: Weak<Inner>, period: Duration) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.check_watchdog();
    }
}
