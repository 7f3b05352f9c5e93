//! Link Metrics
//!
//! Counters describing the health of one controller link.
//!
//! Uses atomic counters so the receive path, the lifecycle worker and command
//! callers can record without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for a single connection manager
#[derive(Debug)]
pub struct LinkMetrics {
    /// Packets decoded and dispatched
    pub packets_received: AtomicU64,
    /// Raw bytes read from the channel
    pub bytes_received: AtomicU64,
    /// Reads that contained a malformed packet
    pub malformed_reads: AtomicU64,
    /// Frames handed to the channel successfully
    pub frames_sent: AtomicU64,
    /// Frames that failed to send
    pub send_failures: AtomicU64,
    /// Frames dropped because the link was not connected
    pub sends_dropped: AtomicU64,
    /// Successful connects
    pub connects_succeeded: AtomicU64,
    /// Failed connects
    pub connects_failed: AtomicU64,
    /// Reconnects scheduled after going offline
    pub reconnects_scheduled: AtomicU64,
    /// Keep-alive pings issued by the watchdog
    pub pings_sent: AtomicU64,
    start_time: Instant,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            malformed_reads: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            sends_dropped: AtomicU64::new(0),
            connects_succeeded: AtomicU64::new(0),
            connects_failed: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn read_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_read(&self) {
        self.malformed_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_succeeded(&self) {
        self.connects_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connects_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_reads: self.malformed_reads.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            connects_succeeded: self.connects_succeeded.load(Ordering::Relaxed),
            connects_failed: self.connects_failed.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_received = snapshot.packets_received,
            bytes_received = snapshot.bytes_received,
            malformed_reads = snapshot.malformed_reads,
            frames_sent = snapshot.frames_sent,
            send_failures = snapshot.send_failures,
            sends_dropped = snapshot.sends_dropped,
            connects_succeeded = snapshot.connects_succeeded,
            connects_failed = snapshot.connects_failed,
            reconnects_scheduled = snapshot.reconnects_scheduled,
            pings_sent = snapshot.pings_sent,
            uptime_seconds = snapshot.uptime_seconds,
            "Link metrics snapshot"
        );
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of link metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LinkMetricsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub malformed_reads: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub sends_dropped: u64,
    pub connects_succeeded: u64,
    pub connects_failed: u64,
    pub reconnects_scheduled: u64,
    pub pings_sent: u64,
    pub uptime_seconds: u64,
}
