//! Counters for read-through store activity.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read-through store metrics (thread-safe counters).
#[derive(Debug, Clone)]
pub struct StoreMetrics {
    /// Reads served by the local store
    pub local_hits: Arc<AtomicU64>,
    /// Reads that fell through to the remote fetcher
    pub remote_fetches: Arc<AtomicU64>,
    /// Bytes received from the remote fetcher
    pub remote_bytes: Arc<AtomicU64>,
    /// Remote fetches that failed
    pub remote_errors: Arc<AtomicU64>,
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self {
            local_hits: Arc::new(AtomicU64::new(0)),
            remote_fetches: Arc::new(AtomicU64::new(0)),
            remote_bytes: Arc::new(AtomicU64::new(0)),
            remote_errors: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl StoreMetrics {
    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_fetch(&self, bytes: usize) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
        self.remote_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            remote_bytes: self.remote_bytes.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.local_hits.store(0, Ordering::Relaxed);
        self.remote_fetches.store(0, Ordering::Relaxed);
        self.remote_bytes.store(0, Ordering::Relaxed);
        self.remote_errors.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetricsSnapshot {
    pub local_hits: u64,
    pub remote_fetches: u64,
    pub remote_bytes: u64,
    pub remote_errors: u64,
}

impl StoreMetricsSnapshot {
    pub fn total_lookups(&self) -> u64 {
        self.local_hits + self.remote_fetches + self.remote_errors
    }

    /// Fraction of lookups served without touching the network.
    pub fn local_hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 0.0;
        }
        self.local_hits as f64 / total as f64
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Block Store Metrics".to_string());
        lines.push("=".repeat(40));
        lines.push(format!("  Local hits:      {}", self.local_hits));
        lines.push(format!("  Remote fetches:  {}", self.remote_fetches));
        lines.push(format!("  Remote bytes:    {}", self.remote_bytes));
        lines.push(format!("  Remote errors:   {}", self.remote_errors));
        lines.push(format!(
            "  Local hit rate:  {:.1}%",
            self.local_hit_rate() * 100.0
        ));
        lines.join("\n")
    }
}
