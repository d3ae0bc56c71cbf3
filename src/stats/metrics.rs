//! Statistics for the chat relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server-wide counters, updated from every connection task
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_active: AtomicU64,
    messages_relayed: AtomicU64,
    frames_malformed: AtomicU64,
    names_rejected: AtomicU64,
    deliveries_dropped: AtomicU64,
}

/// Point-in-time copy of `RelayStats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total connections ever accepted
    pub connections_accepted: u64,
    /// Connections currently open
    pub connections_active: u64,
    /// Chat messages broadcast
    pub messages_relayed: u64,
    /// Inbound frames discarded as malformed
    pub frames_malformed: u64,
    /// `setUsername` requests refused
    pub names_rejected: u64,
    /// Per-recipient deliveries skipped (full or closed queue)
    pub deliveries_dropped: u64,
    /// Time since the stats were created
    pub uptime: Duration,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            names_rejected: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturate rather than wrap if a close is ever double counted
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn message_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn name_rejected(&self) {
        self.names_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deliveries_dropped(&self, count: usize) {
        if count > 0 {
            self.deliveries_dropped
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Read every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            names_rejected: self.names_rejected.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
