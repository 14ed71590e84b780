use std::ptr::NonNull;

use crate::{
    config::PoolConfig,
    error::{PoolError, Result},
    freelist::{Link, SlotIndex},
    kernel::{self, page_size},
    utils::checked_align,
};

/// One contiguous reservation holding every slot of a pool.
///
/// The region is carved into `capacity` slots of `stride` bytes each. Strides
/// are cache-line aligned and the base is page aligned, so every slot starts on
/// its own cache line.
///
/// ```text
///  base
///   |
///   v
/// +----------+----------+----------+-----+----------+---------+
/// |  slot 0  |  slot 1  |  slot 2  | ... | slot n-1 | padding |
/// +----------+----------+----------+-----+----------+---------+
///  <-stride->                                        ^ up to page size
/// ```
///
/// While a slot is free its first four bytes hold the index of the next free
/// slot (see [`Link`]). While it is allocated nothing here touches it.
pub(crate) struct Region {
    /// Start of the mapping returned by the kernel.
    base: NonNull<u8>,
    /// Length of the mapping, a multiple of the page size.
    len: usize,
    /// Distance between two slots.
    stride: usize,
    /// Number of slots carved out of the mapping.
    capacity: usize,
}

// SAFETY: the region is a plain block of memory. Which thread may touch which
// slot is decided by the free list and the slot handles, not by the region.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

/// End-of-list marker stored in a free slot.
const END: u32 = u32::MAX;

impl Region {
    /// Reserves a region big enough for `config.capacity` slots.
    ///
    /// `config` must already be validated.
    pub fn reserve(config: &PoolConfig) -> Result<Self> {
        let stride = config.stride();
        let payload = stride
            .checked_mul(config.capacity)
            .ok_or(PoolError::InvalidConfig {
                field: "capacity",
                reason: "times slot size overflows usize",
            })?;
        let len = checked_align(payload, page_size()).ok_or(
            PoolError::InvalidConfig {
                field: "capacity",
                reason: "region does not fit in the address space",
            },
        )?;

        let base = unsafe { kernel::request_memory(len) }
            .map_err(|source| PoolError::Reserve { bytes: len, source })?;

        Ok(Self {
            base,
            len,
            stride,
            capacity: config.capacity,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Address of the first byte of slot `index`.
    #[inline]
    pub fn slot_ptr(&self, index: SlotIndex) -> NonNull<u8> {
        debug_assert!(index.as_usize() < self.capacity);
        // SAFETY: index < capacity, so the offset stays inside the mapping.
        unsafe { self.base.add(index.as_usize() * self.stride) }
    }

    /// Reads the successor stored in a free slot.
    ///
    /// **SAFETY**: `index` must be free and owned by the caller (held under the
    /// pool lock or in the caller's thread cache).
    #[inline]
    pub unsafe fn read_link(&self, index: SlotIndex) -> Link {
        let raw = unsafe { self.slot_ptr(index).cast::<u32>().read() };
        match raw {
            END => None,
            next => Some(SlotIndex::from_raw(next)),
        }
    }

    /// Writes the successor of a free slot.
    ///
    /// **SAFETY**: same as [`Region::read_link`].
    #[inline]
    pub unsafe fn write_link(&self, index: SlotIndex, next: Link) {
        let raw = next.map_or(END, SlotIndex::raw);
        unsafe { self.slot_ptr(index).cast::<u32>().write(raw) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        tracing::debug!(bytes = self.len, slots = self.capacity, "returning backing region");
        // SAFETY: the region is only dropped together with the last reference
        // to the pool's shared state, so no slot or cache can reach it.
        unsafe { kernel::return_memory(self.base, self.len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::align;

    fn region(capacity: usize, slot_size: usize) -> Region {
        Region::reserve(&PoolConfig::new(capacity).slot_size(slot_size)).unwrap()
    }

    #[test]
    fn length_is_page_aligned() {
        let region = region(3, 100);
        assert_eq!(region.len() % page_size(), 0);
        assert!(region.len() >= 3 * 128);
        assert_eq!(region.len(), align(3 * 128, page_size()));
    }

    #[test]
    fn slots_are_cache_line_aligned_and_disjoint() {
        let region = region(8, 1);
        for i in 0..8 {
            let ptr = region.slot_ptr(SlotIndex::new(i)).as_ptr() as usize;
            assert_eq!(ptr % crate::utils::CACHE_LINE, 0);
            if i > 0 {
                let prev = region.slot_ptr(SlotIndex::new(i - 1)).as_ptr() as usize;
                assert_eq!(ptr - prev, 64);
            }
        }
    }

    #[test]
    fn links_live_in_the_slot() {
        let region = region(2, 64);
        unsafe {
            region.write_link(SlotIndex::new(0), Some(SlotIndex::new(1)));
            region.write_link(SlotIndex::new(1), None);
            assert_eq!(region.read_link(SlotIndex::new(0)), Some(SlotIndex::new(1)));
            assert_eq!(region.read_link(SlotIndex::new(1)), None);
        }
    }
}
