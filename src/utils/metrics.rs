//! Server and connection counters
//!
//! Atomic counters shared between the accept loop and connection tasks.
//! The receive-queue counters mirror how often a connection's reader had to
//! queue a message, how often the application found one waiting, and how often
//! reading paused because the queue was full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections refused at the connection limit
    pub connections_rejected: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Messages the reader queued for the application
    pub recv_enqueue: AtomicU64,
    /// Receives satisfied from the queue without waiting
    pub recv_dequeue: AtomicU64,
    /// Receives that had to wait for the next message
    pub recv_wait: AtomicU64,
    /// Times a reader paused because its queue was full
    pub pause_count: AtomicU64,
    /// Preamble, version or body framing errors
    pub frame_errors: AtomicU64,
    /// Commands that returned an error reply
    pub command_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            recv_enqueue: AtomicU64::new(0),
            recv_dequeue: AtomicU64::new(0),
            recv_wait: AtomicU64::new(0),
            pause_count: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            command_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn recv_enqueued(&self) {
        self.recv_enqueue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recv_dequeued(&self) {
        self.recv_dequeue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recv_waited(&self) {
        self.recv_wait.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reader_paused(&self) {
        self.pause_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_error(&self) {
        self.command_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            recv_enqueue: self.recv_enqueue.load(Ordering::Relaxed),
            recv_dequeue: self.recv_dequeue.load(Ordering::Relaxed),
            recv_wait: self.recv_wait.load(Ordering::Relaxed),
            pause_count: self.pause_count.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            command_errors: self.command_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            recv_enqueue = snapshot.recv_enqueue,
            recv_dequeue = snapshot.recv_dequeue,
            recv_wait = snapshot.recv_wait,
            pause_count = snapshot.pause_count,
            frame_errors = snapshot.frame_errors,
            command_errors = snapshot.command_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub recv_enqueue: u64,
    pub recv_dequeue: u64,
    pub recv_wait: u64,
    pub pause_count: u64,
    pub frame_errors: u64,
    pub command_errors: u64,
    pub uptime_seconds: u64,
}

/// Logs the duration of an operation when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
