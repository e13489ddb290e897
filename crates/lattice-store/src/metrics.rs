//! In-process datastore metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Operation counters and latency accumulators for a datastore backend.
#[derive(Debug)]
pub struct StoreMetrics {
    // Forward and reverse tuple queries
    query_count: AtomicU64,
    query_latency_us: AtomicU64,
    query_errors: AtomicU64,

    // Tuple write transactions
    write_count: AtomicU64,
    write_latency_us: AtomicU64,
    write_errors: AtomicU64,

    // Namespace reads and writes
    namespace_count: AtomicU64,
    namespace_latency_us: AtomicU64,
    namespace_errors: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self {
            query_count: AtomicU64::new(0),
            query_latency_us: AtomicU64::new(0),
            query_errors: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            write_latency_us: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            namespace_count: AtomicU64::new(0),
            namespace_latency_us: AtomicU64::new(0),
            namespace_errors: AtomicU64::new(0),
        }
    }

    /// Record a forward or reverse query.
    pub fn record_query(&self, duration: Duration, error: bool) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.query_latency_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.query_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a tuple write transaction.
    pub fn record_write(&self, duration: Duration, error: bool) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_latency_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a namespace read or write.
    pub fn record_namespace(&self, duration: Duration, error: bool) {
        self.namespace_count.fetch_add(1, Ordering::Relaxed);
        self.namespace_latency_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.namespace_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let query_count = self.query_count.load(Ordering::Relaxed);
        let write_count = self.write_count.load(Ordering::Relaxed);
        let namespace_count = self.namespace_count.load(Ordering::Relaxed);

        let query_latency_us = self.query_latency_us.load(Ordering::Relaxed);
        let write_latency_us = self.write_latency_us.load(Ordering::Relaxed);
        let namespace_latency_us = self.namespace_latency_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            query_count,
            query_avg_latency_us: if query_count > 0 {
                query_latency_us / query_count
            } else {
                0
            },
            query_errors: self.query_errors.load(Ordering::Relaxed),
            write_count,
            write_avg_latency_us: if write_count > 0 {
                write_latency_us / write_count
            } else {
                0
            },
            write_errors: self.write_errors.load(Ordering::Relaxed),
            namespace_count,
            namespace_avg_latency_us: if namespace_count > 0 {
                namespace_latency_us / namespace_count
            } else {
                0
            },
            namespace_errors: self.namespace_errors.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.query_count.store(0, Ordering::Relaxed);
        self.query_latency_us.store(0, Ordering::Relaxed);
        self.query_errors.store(0, Ordering::Relaxed);
        self.write_count.store(0, Ordering::Relaxed);
        self.write_latency_us.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
        self.namespace_count.store(0, Ordering::Relaxed);
        self.namespace_latency_us.store(0, Ordering::Relaxed);
        self.namespace_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub query_count: u64,
    pub query_avg_latency_us: u64,
    pub query_errors: u64,
    pub write_count: u64,
    pub write_avg_latency_us: u64,
    pub write_errors: u64,
    pub namespace_count: u64,
    pub namespace_avg_latency_us: u64,
    pub namespace_errors: u64,
}

/// Helper to measure operation duration.
pub struct OpTimer {
    start: Instant,
}

impl OpTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for OpTimer {
    fn default() -> Self {
        Self::new()
    }
}
