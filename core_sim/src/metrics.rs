use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters shared by the scheduler and the connection tasks.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    ticks: AtomicU64,
    broadcasts: AtomicU64,
    frames_delivered: AtomicU64,
    broadcast_evictions: AtomicU64,
    encode_failures: AtomicU64,
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub broadcasts: u64,
    pub frames_delivered: u64,
    /// Subscribers dropped because a broadcast could not enqueue to them.
    pub broadcast_evictions: u64,
    pub encode_failures: u64,
    pub connections_accepted: u64,
    pub connections_closed: u64,
}

impl MetricsSnapshot {
    pub fn live_connections(&self) -> u64 {
        self.connections_accepted
            .saturating_sub(self.connections_closed)
    }
}

impl ServerMetrics {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, delivered: usize, evicted: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.frames_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.broadcast_evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            broadcast_evictions: self.broadcast_evictions.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
        }
    }
}
