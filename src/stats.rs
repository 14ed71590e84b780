//! Diagnostic counters. None of these take part in correctness.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one thread's cache for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Slots currently held by the cache.
    pub cached: usize,
    /// Successful `allocate` calls.
    pub allocations: u64,
    /// `release` calls that went through the cache.
    pub releases: u64,
    /// Times the thread went to sleep on an empty pool. A thread woken by a
    /// broadcast that finds the slots already taken and sleeps again counts
    /// twice.
    pub waits: u64,
}

/// Pool-wide transfer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Batches moved from the pool into a cache.
    pub refills: u64,
    /// Batches moved from a full cache back to the pool.
    pub flushes: u64,
    /// Caches emptied into the pool on thread stop.
    pub repatriations: u64,
    /// Times any thread started waiting for supply. Re-blocks inside one wait
    /// are not counted again.
    pub wait_episodes: u64,
}

/// Atomic pool statistics for lock-free updates.
#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    refills: AtomicU64,
    flushes: AtomicU64,
    repatriations: AtomicU64,
    wait_episodes: AtomicU64,
}

impl AtomicPoolStats {
    pub const fn new() -> Self {
        Self {
            refills: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            repatriations: AtomicU64::new(0),
            wait_episodes: AtomicU64::new(0),
        }
    }

    /// Take a snapshot of current stats.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            refills: self.refills.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            repatriations: self.repatriations.load(Ordering::Relaxed),
            wait_episodes: self.wait_episodes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.refills.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.repatriations.store(0, Ordering::Relaxed);
        self.wait_episodes.store(0, Ordering::Relaxed);
    }

    pub fn record_refill(&self) {
        self.refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repatriation(&self) {
        self.repatriations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait(&self) {
        self.wait_episodes.fetch_add(1, Ordering::Relaxed);
    }
}
