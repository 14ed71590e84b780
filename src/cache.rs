use std::{collections::VecDeque, sync::Arc};

use crate::{
    error::{PoolError, Result},
    freelist::{Chain, SlotIndex},
    pool::Shared,
    stats::CacheStats,
};

/// One thread's private stock of free slots for one pool.
///
/// Allocations pop the newest entry and releases push to the back, so the
/// common path is a plain `VecDeque` operation with no lock. The cache only
/// talks to the shared pool when it runs dry (refill) or overflows (flush):
///
/// ```text
///            oldest                     newest
///             +----+----+----+----+----+----+
///   flush <-- |    |    |    |    |    |    | <-- release
///             +----+----+----+----+----+----+
///                                          --> allocate
/// ```
///
/// A flush hands the oldest half back and keeps the newest, so a thread that
/// alternates allocate/release right at the boundary doesn't bounce between
/// refill and flush on every call.
///
/// The cache is only ever touched by the thread that owns it. Dropping it
/// gives every remaining slot back to the pool.
pub(crate) struct ThreadCache {
    slots: VecDeque<SlotIndex>,
    shared: Arc<Shared>,
    allocations: u64,
    releases: u64,
    waits: u64,
}

impl ThreadCache {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self {
            slots: VecDeque::with_capacity(shared.config().cache_capacity),
            shared,
            allocations: 0,
            releases: 0,
            waits: 0,
        }
    }

    #[inline]
    pub fn pool_id(&self) -> u64 {
        self.shared.id()
    }

    /// Whether the pool handle this cache serves has been dropped.
    pub fn is_orphaned(&self) -> bool {
        self.shared.is_closed()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Pops a slot, refilling from the pool first if the cache is empty.
    /// Blocks while the pool is empty.
    pub fn allocate(&mut self) -> Result<SlotIndex> {
        if self.slots.is_empty() {
            self.refill();
        }

        let slot = self.slots.pop_back().ok_or(PoolError::Exhausted)?;
        self.allocations += 1;
        Ok(slot)
    }

    /// Pushes a slot, flushing first if the cache is full.
    pub fn release(&mut self, slot: SlotIndex) {
        self.releases += 1;

        if self.slots.len() >= self.shared.config().cache_capacity {
            self.flush();
        }

        self.slots.push_back(slot);
        debug_assert!(self.slots.len() <= self.shared.config().cache_capacity);
    }

    /// Moves up to `batch_size` slots from the pool into the cache, waiting
    /// for supply as long as the pool is empty.
    fn refill(&mut self) {
        let batch = self.shared.config().batch_size;

        loop {
            let taken = self.shared.take_batch(batch, &mut self.slots);
            if taken > 0 {
                self.shared.stats().record_refill();
                tracing::trace!(pool = self.pool_id(), taken, "refilled thread cache");
                return;
            }

            // Wakeups are broadcast, so several threads may race for the
            // same batch. Losers come back here and park again.
            self.waits += self.shared.wait_for_supply();
        }
    }

    /// Gives the oldest entries back to the pool until the cache is down to
    /// its flush target.
    fn flush(&mut self) {
        let target = self.shared.config().flush_target();
        let n = self.slots.len().saturating_sub(target);

        // SAFETY: slots in the cache are free and owned by this thread.
        let Some(chain) = (unsafe { Chain::link(self.shared.region(), self.slots.drain(..n)) })
        else {
            return;
        };

        tracing::trace!(pool = self.pool_id(), flushed = chain.len(), "flushed thread cache");
        // SAFETY: the drained slots are no longer in the cache.
        unsafe { self.shared.give_batch(chain) };
        self.shared.stats().record_flush();
    }

    /// Gives every cached slot back to the pool. An empty cache doesn't touch
    /// the pool at all. Returns how many slots were returned.
    pub fn repatriate(&mut self) -> usize {
        // SAFETY: slots in the cache are free and owned by this thread.
        let Some(chain) = (unsafe { Chain::link(self.shared.region(), self.slots.drain(..)) })
        else {
            return 0;
        };

        let returned = chain.len();
        // SAFETY: the drained slots are no longer in the cache.
        unsafe { self.shared.give_batch(chain) };
        self.shared.stats().record_repatriation();
        tracing::debug!(pool = self.pool_id(), returned, "repatriated thread cache");

        returned
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached: self.len(),
            allocations: self.allocations,
            releases: self.releases,
            waits: self.waits,
        }
    }
}

impl Drop for ThreadCache {
    fn drop(&mut self) {
        self.repatriate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::Pool;

    // Caches are normally reached through the registry; these tests build
    // them by hand around a pool's shared state.
    fn cache(config: PoolConfig) -> (Pool, ThreadCache) {
        let pool = Pool::with_config(config).unwrap();
        let cache = ThreadCache::new(pool.shared());
        (pool, cache)
    }

    #[test]
    fn first_allocate_refills_one_batch() {
        let (pool, mut cache) = cache(
            PoolConfig::new(16)
                .slot_size(64)
                .cache_capacity(8)
                .batch_size(4),
        );

        cache.allocate().unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(pool.available(), 12);
        assert_eq!(pool.stats().refills, 1);
    }

    #[test]
    fn refill_takes_what_is_left() {
        let (pool, mut cache) = cache(
            PoolConfig::new(3)
                .slot_size(64)
                .cache_capacity(4)
                .batch_size(4),
        );

        cache.allocate().unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn release_below_capacity_stays_local() {
        let (pool, mut cache) = cache(
            PoolConfig::new(8)
                .slot_size(64)
                .cache_capacity(4)
                .batch_size(2),
        );

        let a = cache.allocate().unwrap();
        let b = cache.allocate().unwrap();
        cache.release(a);
        cache.release(b);

        assert_eq!(cache.len(), 2);
        assert_eq!(pool.available(), 6);
        assert_eq!(pool.stats().flushes, 0);
    }

    #[test]
    fn overflow_flushes_down_to_half() {
        let (pool, mut cache) = cache(
            PoolConfig::new(32)
                .slot_size(64)
                .cache_capacity(8)
                .batch_size(4),
        );

        let mut held: Vec<_> = (0..9).map(|_| cache.allocate().unwrap()).collect();
        assert_eq!(cache.len(), 3);
        let before = pool.available();

        for slot in held.drain(..5) {
            cache.release(slot);
        }
        assert_eq!(cache.len(), 8);
        assert_eq!(pool.stats().flushes, 0);

        // Full: flush down to 4, then the released slot lands on top.
        cache.release(held.pop().unwrap());
        assert_eq!(pool.stats().flushes, 1);
        assert_eq!(pool.available(), before + 4);
        assert_eq!(cache.len(), 5);

        for slot in held {
            cache.release(slot);
        }
    }

    #[test]
    fn flush_returns_oldest_entries() {
        let (pool, mut cache) = cache(
            PoolConfig::new(4)
                .slot_size(64)
                .cache_capacity(2)
                .batch_size(2),
        );

        let a = cache.allocate().unwrap();
        let b = cache.allocate().unwrap();
        let c = cache.allocate().unwrap();
        cache.release(a);
        cache.release(b);
        // Full: `a` is oldest and goes back.
        cache.release(c);
        assert_eq!(cache.slots, VecDeque::from([b, c]));

        let mut out = VecDeque::new();
        pool.shared().take_batch(4, &mut out);
        assert!(out.contains(&a));
    }

    #[test]
    fn repatriate_empties_cache() {
        let (pool, mut cache) = cache(
            PoolConfig::new(8)
                .slot_size(64)
                .cache_capacity(8)
                .batch_size(8),
        );

        cache.allocate().unwrap();
        assert_eq!(cache.repatriate(), 7);
        assert_eq!(cache.len(), 0);
        assert_eq!(pool.available(), 7);
        assert_eq!(pool.stats().repatriations, 1);

        assert_eq!(cache.repatriate(), 0);
        assert_eq!(pool.stats().repatriations, 1);
    }

    #[test]
    fn drop_repatriates() {
        let (pool, mut cache) = cache(
            PoolConfig::new(8)
                .slot_size(64)
                .cache_capacity(8)
                .batch_size(8),
        );

        cache.allocate().unwrap();
        drop(cache);
        assert_eq!(pool.available(), 7);
    }

    #[test]
    fn counters_track_calls() {
        let (_pool, mut cache) = cache(
            PoolConfig::new(8)
                .slot_size(64)
                .cache_capacity(4)
                .batch_size(2),
        );

        let a = cache.allocate().unwrap();
        let b = cache.allocate().unwrap();
        cache.release(a);

        let stats = cache.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.waits, 0);
        assert_eq!(stats.cached, 1);
        cache.release(b);
    }

    #[test]
    fn orphaned_once_pool_is_gone() {
        let (pool, cache) = cache(
            PoolConfig::new(2)
                .slot_size(64)
                .cache_capacity(2)
                .batch_size(1),
        );
        assert!(!cache.is_orphaned());
        drop(pool);
        assert!(cache.is_orphaned());
    }
}
