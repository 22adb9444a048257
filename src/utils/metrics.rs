//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring protocol
//! performance and health.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Total frames sent
    pub frames_sent: AtomicU64,
    /// Total frames received
    pub frames_received: AtomicU64,
    /// Frames dropped as undecodable
    pub frames_dropped: AtomicU64,
    /// Decoded packets published for dispatch
    pub packets_published: AtomicU64,
    /// Application bodies with no registered decoder
    pub packets_unknown: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Replication baselines sent to new observers
    pub baselines_sent: AtomicU64,
    /// Replication deltas emitted
    pub deltas_emitted: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            packets_published: AtomicU64::new(0),
            packets_unknown: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            baselines_sent: AtomicU64::new(0),
            deltas_emitted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a frame sent with its wire size
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record raw bytes received from the transport
    pub fn bytes_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record frames drained from a session buffer
    pub fn frames_received(&self, count: u64) {
        self.frames_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a frame dropped as undecodable
    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet published for dispatch
    pub fn packet_published(&self) {
        self.packets_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an application body nobody could decode
    pub fn packet_unknown(&self) {
        self.packets_unknown.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a baseline pushed to a new observer
    pub fn baseline_sent(&self) {
        self.baselines_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delta broadcast to observers
    pub fn delta_emitted(&self) {
        self.deltas_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            packets_published: self.packets_published.load(Ordering::Relaxed),
            packets_unknown: self.packets_unknown.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            baselines_sent: self.baselines_sent.load(Ordering::Relaxed),
            deltas_emitted: self.deltas_emitted.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            frames_dropped = snapshot.frames_dropped,
            packets_published = snapshot.packets_published,
            packets_unknown = snapshot.packets_unknown,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            baselines_sent = snapshot.baselines_sent,
            deltas_emitted = snapshot.deltas_emitted,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub packets_published: u64,
    pub packets_unknown: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub baselines_sent: u64,
    pub deltas_emitted: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();
        metrics.frames_received(3);
        metrics.frame_sent(120);
        metrics.packet_published();
        metrics.delta_emitted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.frames_received, 3);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.bytes_sent, 120);
        assert_eq!(snapshot.packets_published, 1);
        assert_eq!(snapshot.deltas_emitted, 1);
    }

    #[test]
    fn global_instance_is_shared() {
        let before = global_metrics().snapshot().frames_dropped;
        global_metrics().frame_dropped();
        assert!(global_metrics().snapshot().frames_dropped > before);
    }
}
