//! Process-wide operational counters, surfaced through `GET /api/health`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics handle for recording counters/gauges.
#[derive(Debug, Default)]
pub struct Metrics {
    transactions_accepted: AtomicU64,
    transactions_completed: AtomicU64,
    transactions_failed: AtomicU64,
    transactions_retried: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_accepted(&self) {
        self.transactions_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transactions_accepted", "metric incremented");
    }

    pub fn transaction_completed(&self) {
        self.transactions_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transactions_completed", "metric incremented");
    }

    pub fn transaction_failed(&self) {
        self.transactions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transactions_failed", "metric incremented");
    }

    pub fn transaction_retried(&self) {
        self.transactions_retried.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "transactions_retried", "metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_accepted: self.transactions_accepted.load(Ordering::Relaxed),
            transactions_completed: self.transactions_completed.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transactions_retried: self.transactions_retried.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_accepted: u64,
    pub transactions_completed: u64,
    pub transactions_failed: u64,
    pub transactions_retried: u64,
}
