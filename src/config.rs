//! Pool sizing.

use crate::{
    error::{PoolError, Result},
    utils::{CACHE_LINE, align},
};

/// Default usable bytes per slot.
pub const DEFAULT_SLOT_SIZE: usize = 2048;
/// Default number of slots a thread cache may hold before it flushes.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;
/// Default number of slots moved from the pool into a cache per refill.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Largest capacity we accept. `u32::MAX` itself is the end-of-list marker
/// stored inside free slots.
pub const MAX_CAPACITY: usize = u32::MAX as usize - 1;

/// Shape of a [`crate::Pool`].
///
/// ```
/// use slotpool::PoolConfig;
///
/// let config = PoolConfig::new(1024)
///     .slot_size(256)
///     .cache_capacity(64)
///     .batch_size(16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.flush_target(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of slots in the pool.
    pub capacity: usize,
    /// Usable bytes per slot.
    pub slot_size: usize,
    /// Maximum number of slots held by one thread cache.
    pub cache_capacity: usize,
    /// Slots taken from the pool per refill.
    pub batch_size: usize,
}

impl PoolConfig {
    /// A configuration for `capacity` slots with every other field defaulted.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slot_size: DEFAULT_SLOT_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub const fn slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    #[must_use]
    pub const fn cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Number of slots a cache keeps after an overflow flush.
    #[inline]
    pub const fn flush_target(&self) -> usize {
        self.cache_capacity / 2
    }

    /// Distance in bytes between two consecutive slots in the region.
    #[inline]
    pub const fn stride(&self) -> usize {
        align(self.slot_size, CACHE_LINE)
    }

    /// Checks every field, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason| Err(PoolError::InvalidConfig { field, reason });

        if self.capacity == 0 {
            return invalid("capacity", "must be greater than zero");
        }
        if self.capacity > MAX_CAPACITY {
            return invalid("capacity", "must be below u32::MAX");
        }
        if self.slot_size == 0 {
            return invalid("slot_size", "must be greater than zero");
        }
        if self.slot_size > usize::MAX - CACHE_LINE {
            return invalid("slot_size", "is too large to align");
        }
        if self.cache_capacity == 0 {
            return invalid("cache_capacity", "must be greater than zero");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be greater than zero");
        }
        if self.batch_size > self.cache_capacity {
            return invalid("batch_size", "must not exceed cache_capacity");
        }
        if self.stride().checked_mul(self.capacity).is_none() {
            return invalid("capacity", "times slot size overflows usize");
        }

        Ok(())
    }
}
