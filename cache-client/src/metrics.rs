//! Diagnostic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache counters, updated lock-free by the engine and dispatcher.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Refreshes whose result was reconciled into the table.
    pub refreshes: AtomicU64,
    /// Refreshes abandoned after a store error.
    pub refresh_failures: AtomicU64,
    /// Reads discarded because they were not newer than the cached state.
    pub stale_discarded: AtomicU64,
    /// Events delivered to the listener set.
    pub events_dispatched: AtomicU64,
    /// Listener callbacks that panicked.
    pub listener_panics: AtomicU64,
    /// Re-crawls triggered by connection recovery.
    pub recrawls: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// See [`CacheMetrics::refreshes`].
    pub refreshes: u64,
    /// See [`CacheMetrics::refresh_failures`].
    pub refresh_failures: u64,
    /// See [`CacheMetrics::stale_discarded`].
    pub stale_discarded: u64,
    /// See [`CacheMetrics::events_dispatched`].
    pub events_dispatched: u64,
    /// See [`CacheMetrics::listener_panics`].
    pub listener_panics: u64,
    /// See [`CacheMetrics::recrawls`].
    pub recrawls: u64,
}

impl CacheMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            recrawls: self.recrawls.load(Ordering::Relaxed),
        }
    }
}
