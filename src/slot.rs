use std::{
    fmt,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
};

use crate::{freelist::SlotIndex, pool::Pool};

/// Exclusive ownership of one allocated slot.
///
/// The handle borrows its [`Pool`], so the pool cannot go away while the slot
/// is in use, and it is not `Clone`, so a slot cannot be released twice.
/// Dropping the handle gives the slot back to the pool it came from, through
/// the dropping thread's cache when that thread has one.
///
/// The contents of a freshly allocated slot are unspecified: they hold
/// whatever the previous owner left behind.
pub struct Slot<'pool> {
    pool: &'pool Pool,
    index: SlotIndex,
    ptr: NonNull<u8>,
}

// SAFETY: a `Slot` is the only handle to its bytes, so moving it to another
// thread or sharing `&Slot` is the same as doing so with a `Box<[u8]>`.
unsafe impl Send for Slot<'_> {}
unsafe impl Sync for Slot<'_> {}

impl<'pool> Slot<'pool> {
    pub(crate) fn new(pool: &'pool Pool, index: SlotIndex, ptr: NonNull<u8>) -> Self {
        Self { pool, index, ptr }
    }

    /// Position of the slot inside the pool's region, in `0..capacity`.
    #[inline]
    pub fn index(&self) -> usize {
        self.index.as_usize()
    }

    /// Usable bytes, the pool's slot size.
    #[inline]
    pub fn len(&self) -> usize {
        self.pool.slot_size()
    }

    /// Slots are never empty; provided for API symmetry with slices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the slot. Valid for `len()` bytes while the handle lives and
    /// aligned to a cache line.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the slot is `len()` bytes inside the mapped region, which
        // outlives `'pool`, and this handle has exclusive access to it.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `as_bytes`; `&mut self` makes the borrow unique.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    /// The pool this slot belongs to.
    #[inline]
    pub fn pool(&self) -> &'pool Pool {
        self.pool
    }
}

impl Deref for Slot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl DerefMut for Slot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.pool.give_back(self.index);
    }
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index())
            .field("ptr", &self.ptr)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Pool, PoolConfig, utils::CACHE_LINE};

    fn pool() -> Pool {
        let config = PoolConfig::new(8)
            .slot_size(100)
            .cache_capacity(4)
            .batch_size(2);
        let pool = Pool::with_config(config).unwrap();
        pool.init_thread();
        pool
    }

    #[test]
    fn slot_exposes_slot_size_bytes() {
        let pool = pool();
        let slot = pool.allocate().unwrap();

        assert_eq!(slot.len(), 100);
        assert!(!slot.is_empty());
        assert!(slot.index() < 8);
        assert_eq!(slot.as_ptr() as usize % CACHE_LINE, 0);
        assert!(std::ptr::eq(slot.pool(), &pool));
    }

    #[test]
    fn writes_stay_in_the_slot() {
        let pool = pool();
        let mut a = pool.allocate().unwrap();
        let mut b = pool.allocate().unwrap();

        a.fill(0xAA);
        b.fill(0xBB);

        assert!(a.iter().all(|&byte| byte == 0xAA));
        assert!(b.iter().all(|&byte| byte == 0xBB));
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn drop_returns_to_thread_cache() {
        let pool = pool();
        let slot = pool.allocate().unwrap();
        assert_eq!(pool.thread_stats().unwrap().cached, 1);

        drop(slot);
        let stats = pool.thread_stats().unwrap();
        assert_eq!(stats.cached, 2);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn released_slot_is_reused_first() {
        let pool = pool();
        let slot = pool.allocate().unwrap();
        let index = slot.index();
        pool.release(slot);

        assert_eq!(pool.allocate().unwrap().index(), index);
    }
}
