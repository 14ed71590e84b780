//! The process-wide side of the allocator: one free list shared by every
//! thread, guarded by a short lock, plus a wait channel for threads that find
//! it empty.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::{
    config::PoolConfig,
    error::{PoolError, Result},
    freelist::{Chain, FreeList, SlotIndex},
    region::Region,
    registry,
    slot::Slot,
    stats::{AtomicPoolStats, CacheStats, PoolStats},
};

/// Source of [`Shared::id`]. Ids are never reused within a process.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Threads parked on an empty pool.
struct WaitChannel {
    /// How many threads are inside [`Shared::wait_for_supply`].
    waiters: Mutex<usize>,
    cond: Condvar,
}

/// State shared by a [`Pool`] handle and every thread cache bound to it.
///
/// The free list lock and the wait channel sit on separate cache lines so that
/// parked threads don't slow down the splice path.
pub(crate) struct Shared {
    id: u64,
    config: PoolConfig,
    free: CachePadded<Mutex<FreeList>>,
    wait: CachePadded<WaitChannel>,
    stats: AtomicPoolStats,
    /// Set once the owning [`Pool`] handle is gone.
    closed: AtomicBool,
    region: Region,
}

impl Shared {
    fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let region = Region::reserve(&config)?;
        // SAFETY: the region was just mapped, nobody else holds its slots.
        let free = unsafe { FreeList::with_all_slots(&region) };

        Ok(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            free: CachePadded::new(Mutex::new(free)),
            wait: CachePadded::new(WaitChannel {
                waiters: Mutex::new(0),
                cond: Condvar::new(),
            }),
            stats: AtomicPoolStats::new(),
            closed: AtomicBool::new(false),
            region,
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    #[inline]
    pub fn stats(&self) -> &AtomicPoolStats {
        &self.stats
    }

    /// Whether the [`Pool`] handle has been dropped. Caches still bound to a
    /// closed pool only wait to give their slots back.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Number of slots on the free list right now.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Pops up to `max_n` slots into `out`. Never blocks on supply; an empty
    /// list yields zero.
    pub fn take_batch(&self, max_n: usize, out: &mut VecDeque<SlotIndex>) -> usize {
        let mut free = self.free.lock();
        // SAFETY: the list was built over `self.region`.
        unsafe { free.take(&self.region, max_n, out) }
    }

    /// Splices `chain` onto the free list and wakes parked threads if the
    /// list was empty before. Waiters are woken after the list lock is
    /// released.
    ///
    /// **SAFETY**: every slot of `chain` must be a free slot of this pool that
    /// is not already on the list.
    pub unsafe fn give_batch(&self, chain: Chain) {
        let was_empty = {
            let mut free = self.free.lock();
            unsafe { free.give(&self.region, chain) }
        };

        if was_empty {
            self.notify_waiters();
        }
    }

    /// Returns a single slot straight to the free list, bypassing any cache.
    ///
    /// **SAFETY**: same as [`Shared::give_batch`].
    pub unsafe fn give_one(&self, slot: SlotIndex) {
        unsafe {
            if let Some(chain) = Chain::link(&self.region, [slot]) {
                self.give_batch(chain);
            }
        }
    }

    /// Parks the calling thread until the free list looks non-empty.
    ///
    /// Returns how many times the thread went to sleep: zero if there was
    /// supply already, more than one if a wakeup found the list drained again
    /// by another thread. Supply on return is only a hint, so callers loop on
    /// [`Shared::take_batch`].
    pub fn wait_for_supply(&self) -> u64 {
        let mut waiters = self.wait.waiters.lock();
        *waiters += 1;

        // Checked under the wait lock: a giver that refills the list after
        // this check has to take the wait lock to notify, so it sees us.
        let mut sleeps = 0;
        while !self.has_supply() {
            if sleeps == 0 {
                self.stats.record_wait();
                tracing::debug!(pool = self.id, "pool empty, waiting for supply");
            }
            sleeps += 1;
            self.wait.cond.wait(&mut waiters);
        }

        *waiters -= 1;
        sleeps
    }

    fn has_supply(&self) -> bool {
        !self.free.lock().is_empty()
    }

    fn notify_waiters(&self) {
        let waiters = self.wait.waiters.lock();
        if *waiters > 0 {
            self.wait.cond.notify_all();
        }
    }
}

/// A pool of `capacity` equally sized slots, shared by any number of threads.
///
/// Each thread talks to the pool through its own cache: call
/// [`Pool::init_thread`] once per thread, then [`Pool::allocate`] and
/// [`Pool::release`] (or just drop the [`Slot`]). The cache only goes to the
/// shared free list in batches, so the common path takes no lock.
///
/// When every slot is in use `allocate` blocks until another thread gives
/// slots back. There is no timeout.
///
/// ```
/// use slotpool::{Pool, PoolConfig};
///
/// let pool = Pool::with_config(PoolConfig::new(64).slot_size(128)).unwrap();
/// pool.init_thread();
///
/// let mut slot = pool.allocate().unwrap();
/// slot.as_bytes_mut()[..5].copy_from_slice(b"hello");
/// assert_eq!(&slot.as_bytes()[..5], b"hello");
/// pool.release(slot);
/// ```
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Creates a pool of `capacity` slots with the default slot size.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(capacity))
    }

    /// Creates a pool shaped by `config`.
    ///
    /// The whole region is reserved up front. If the OS refuses,
    /// [`PoolError::Reserve`] is returned and nothing is left behind.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let shared = Shared::new(config)?;
        tracing::debug!(
            pool = shared.id,
            capacity = config.capacity,
            slot_size = config.slot_size,
            region_bytes = shared.region.len(),
            "created pool"
        );

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Binds a cache for this pool to the calling thread. Calling it again on
    /// the same thread does nothing.
    pub fn init_thread(&self) {
        registry::ensure_initialized(&self.shared);
    }

    /// Hands out one slot.
    ///
    /// Served from the thread cache when possible. An empty cache refills
    /// from the pool, blocking while the pool is empty too.
    pub fn allocate(&self) -> Result<Slot<'_>> {
        let index = registry::with_cache(self.shared.id(), |cache| cache.allocate())
            .ok_or(PoolError::ThreadNotInitialized)??;

        let ptr = self.shared.region().slot_ptr(index);
        Ok(Slot::new(self, index, ptr))
    }

    /// Gives a slot back. `None` is ignored.
    ///
    /// Dropping a [`Slot`] does the same thing. The slot always goes back to
    /// the pool it was allocated from.
    pub fn release<'p>(&'p self, slot: impl Into<Option<Slot<'p>>>) {
        drop(slot.into());
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Release path shared by [`Pool::release`] and [`Slot`]'s destructor.
    pub(crate) fn give_back(&self, index: SlotIndex) {
        let cached = registry::with_cache(self.shared.id(), |cache| cache.release(index));

        if cached.is_none() {
            // No cache on this thread (or it is being torn down).
            // SAFETY: the index came from a live `Slot` of this pool.
            unsafe { self.shared.give_one(index) };
        }
    }

    /// Empties the calling thread's cache into the pool and unbinds it.
    /// Returns how many slots went back, `None` if the thread had no cache.
    ///
    /// Thread exit does this automatically; call it when the thread outlives
    /// its use of the pool.
    pub fn deregister_thread(&self) -> Option<usize> {
        registry::deregister(self.shared.id())
    }

    /// Counters of the calling thread's cache, `None` if it has none.
    pub fn thread_stats(&self) -> Option<CacheStats> {
        registry::with_cache(self.shared.id(), |cache| cache.stats())
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats().snapshot()
    }

    pub fn reset_stats(&self) {
        self.shared.stats().reset();
    }

    /// Slots currently on the shared free list. Slots sitting in thread
    /// caches are not counted.
    pub fn available(&self) -> usize {
        self.shared.available()
    }

    pub fn capacity(&self) -> usize {
        self.shared.config().capacity
    }

    /// Usable bytes per slot.
    pub fn slot_size(&self) -> usize {
        self.shared.config().slot_size
    }

    pub fn config(&self) -> &PoolConfig {
        self.shared.config()
    }

    /// Tears the pool down. Same as dropping it.
    ///
    /// Every other thread should have stopped using the pool first. Slots
    /// still cached by other threads keep the backing region mapped until
    /// each of those threads exits or calls `init_thread` on any pool, and
    /// are reported with a warning.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shared.close();
        registry::deregister(self.shared.id());

        let outstanding = self.capacity() - self.available();
        if outstanding > 0 {
            tracing::warn!(
                pool = self.shared.id(),
                outstanding,
                "pool destroyed while other threads still cache slots"
            );
        } else {
            tracing::debug!(pool = self.shared.id(), "destroyed pool");
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id())
            .field("config", self.config())
            .field("available", &self.available())
            .finish()
    }
}
