use std::collections::VecDeque;

use crate::region::Region;

/// Position of a slot inside its [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotIndex(u32);

impl SlotIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize);
        Self(index as u32)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Successor of a free slot, `None` at the end of a list.
pub(crate) type Link = Option<SlotIndex>;

/// Singly linked list of free slots.
///
/// The list does not allocate: every node *is* a free slot, and the link to
/// the next node is written into the first word of the slot's own payload.
/// Since nobody uses the payload of a free slot, linkage costs no memory.
///
/// ```text
///   head
///    |
///    v
/// +--------+      +--------+      +--------+
/// | next --|----> | next --|----> |  END   |
/// |  ...   |      |  ...   |      |  ...   |
/// +--------+      +--------+      +--------+
///   slot 3          slot 0          slot 7
/// ```
///
/// A slot index is only ever in one place: this list, a thread cache, or a
/// [`crate::Slot`] handle. Only the first two read or write its link.
pub(crate) struct FreeList {
    head: Link,
    len: usize,
}

/// A detached run of free slots, already linked to each other, that can be
/// spliced onto a [`FreeList`] in O(1).
#[derive(Debug)]
pub(crate) struct Chain {
    head: SlotIndex,
    tail: SlotIndex,
    len: usize,
}

impl Chain {
    /// Links `slots` together in iteration order. Returns `None` when the
    /// iterator is empty.
    ///
    /// **SAFETY**: every index must be free and owned by the caller.
    pub unsafe fn link<I>(region: &Region, slots: I) -> Option<Self>
    where
        I: IntoIterator<Item = SlotIndex>,
    {
        let mut slots = slots.into_iter();
        let head = slots.next()?;
        let mut tail = head;
        let mut len = 1;

        for slot in slots {
            unsafe { region.write_link(tail, Some(slot)) };
            tail = slot;
            len += 1;
        }
        unsafe { region.write_link(tail, None) };

        Some(Self { head, tail, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }
}

impl FreeList {
    /// Creates a new empty list.
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Builds a list holding every slot of `region`, in memory order.
    ///
    /// **SAFETY**: nobody else may hold any slot of `region`.
    pub unsafe fn with_all_slots(region: &Region) -> Self {
        let capacity = region.capacity();
        let all = (0..capacity).map(SlotIndex::new);

        match unsafe { Chain::link(region, all) } {
            Some(chain) => Self {
                head: Some(chain.head),
                len: chain.len,
            },
            None => Self::new(),
        }
    }

    /// It tells whether the list is empty or not.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Pops up to `max_n` slots off the head and pushes them to the back of
    /// `out`. Never blocks; returns how many were moved.
    ///
    /// **SAFETY**: `region` must be the region this list was built over.
    pub unsafe fn take(
        &mut self,
        region: &Region,
        max_n: usize,
        out: &mut VecDeque<SlotIndex>,
    ) -> usize {
        let mut taken = 0;

        while taken < max_n {
            let Some(slot) = self.head else { break };
            self.head = unsafe { region.read_link(slot) };
            out.push_back(slot);
            taken += 1;
        }

        self.len -= taken;
        taken
    }

    /// Splices `chain` onto the head of the list. Returns whether the list
    /// was empty right before the splice.
    ///
    /// **SAFETY**: `region` must be the region this list was built over and
    /// no slot of `chain` may already be in the list.
    pub unsafe fn give(&mut self, region: &Region, chain: Chain) -> bool {
        let was_empty = self.is_empty();

        unsafe { region.write_link(chain.tail, self.head) };
        self.head = Some(chain.head);
        self.len += chain.len;

        was_empty
    }
}
