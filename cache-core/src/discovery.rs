//! Outstanding-discovery counter for the INITIALIZED milestone.
//!
//! Every unit of crawl work (the root's initial refresh, and each
//! discovered child's initial refresh) is registered with [`begin`] before
//! it is issued and released with [`complete`] once it has been reconciled,
//! including registering any children it discovered. Children are always
//! registered before their parent completes, so the count only reaches zero
//! when the whole tree that existed at start has been resolved.
//!
//! [`begin`]: DiscoveryCounter::begin
//! [`complete`]: DiscoveryCounter::complete

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Counts in-flight crawl work and reports the first time it drains.
#[derive(Debug, Default)]
pub struct DiscoveryCounter {
    outstanding: AtomicUsize,
    initialized: AtomicBool,
}

impl DiscoveryCounter {
    /// Create a counter with no outstanding work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of outstanding work.
    pub fn begin(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one unit of work.
    ///
    /// Returns `true` exactly once per counter: for the call that brings
    /// the count to zero for the first time. Releasing with nothing
    /// outstanding is a no-op.
    pub fn complete(&self) -> bool {
        let released = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match released {
            Ok(1) => !self.initialized.swap(true, Ordering::AcqRel),
            _ => false,
        }
    }

    /// Units of work currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Check whether the milestone has been reached.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}
