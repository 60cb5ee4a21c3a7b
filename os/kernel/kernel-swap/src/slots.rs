//! Swap slot allocation.
//!
//! The swap file is an array of page-sized slots tracked by a bitmap, the same
//! way the frame allocator tracks frames. A slot goes through
//!
//! ```text
//!  free ──reserve──► pending ──commit──► occupied ──release──► free
//!                       │
//!                       └──abort──► free
//! ```
//!
//! `pending` covers the window in which the page is being written to the
//! store: the slot is claimed, so no other page-out can pick it, but it is not
//! yet occupied, so nothing may trust its contents.

use crate::SwapError;
use core::fmt;
use kernel_alloc::bitmap::Bitmap;
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE};
use kernel_sync::SpinLock;
use log::{trace, warn};

/// Index of a page-sized slot in the swap file.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SwapSlot(u32);

impl SwapSlot {
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of the slot in the swap file.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u64 {
        (self.0 as u64) << PAGE_SHIFT
    }

    /// The slot starting at byte `offset`, if it is slot-aligned and in range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_offset(offset: u64) -> Option<Self> {
        if !offset.is_multiple_of(PAGE_SIZE) {
            return None;
        }
        let index = offset >> PAGE_SHIFT;
        if index > u32::MAX as u64 {
            return None;
        }
        Some(Self(index as u32))
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} (offset {:#x})", self.0, self.offset())
    }
}

struct SlotBitmaps {
    /// Pending or occupied.
    claimed: Bitmap,
    occupied: Bitmap,
}

/// Bitmap allocator over the slots of the swap file.
pub struct SwapSlotAllocator {
    slots: SpinLock<SlotBitmaps>,
}

impl SwapSlotAllocator {
    /// An allocator over `capacity` free slots.
    ///
    /// Slot indices are 32 bits wide; a larger capacity is clamped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            slots: SpinLock::named(
                "swap slot bitmap",
                SlotBitmaps {
                    claimed: Bitmap::new(capacity),
                    occupied: Bitmap::new(capacity),
                },
            ),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.with_lock(|s| s.occupied.len())
    }

    /// Claims the lowest free slot without marking it occupied.
    ///
    /// # Errors
    /// [`SwapError::NoFreeSlot`] if every slot is pending or occupied.
    pub fn reserve(&self) -> Result<SwapSlot, SwapError> {
        let slot = self.slots.with_lock(|s| {
            let index = s.claimed.first_clear(0)?;
            s.claimed.set(index);
            Some(SwapSlot::from_index(index))
        });
        let slot = slot.ok_or(SwapError::NoFreeSlot)?;
        trace!("swap: reserved slot {slot}");
        Ok(slot)
    }

    /// Marks a reserved slot occupied, once its contents are in the store.
    pub fn commit(&self, slot: SwapSlot) {
        self.slots.with_lock(|s| {
            debug_assert!(
                s.claimed.is_set(slot.index()) && !s.occupied.is_set(slot.index()),
                "commit of slot {slot} which is not pending"
            );
            s.claimed.set(slot.index());
            s.occupied.set(slot.index());
        });
        trace!("swap: committed slot {slot}");
    }

    /// Returns a reserved slot whose write did not complete.
    pub fn abort(&self, slot: SwapSlot) {
        let aborted = self.slots.with_lock(|s| {
            let pending = slot.index() < s.claimed.len()
                && s.claimed.is_set(slot.index())
                && !s.occupied.is_set(slot.index());
            if pending {
                s.claimed.clear(slot.index());
            }
            pending
        });

        if aborted {
            trace!("swap: aborted slot {slot}");
        } else {
            warn!("swap: abort of slot {slot} which is not pending");
        }
    }

    /// Reserves and immediately commits the lowest free slot.
    ///
    /// # Errors
    /// [`SwapError::NoFreeSlot`] if every slot is pending or occupied.
    pub fn allocate_slot(&self) -> Result<SwapSlot, SwapError> {
        let slot = self.slots.with_lock(|s| {
            let index = s.claimed.first_clear(0)?;
            s.claimed.set(index);
            s.occupied.set(index);
            Some(SwapSlot::from_index(index))
        });
        slot.ok_or(SwapError::NoFreeSlot)
    }

    /// Frees an occupied slot. Returns `false`, and changes nothing, if the
    /// slot was not occupied.
    pub fn release(&self, slot: SwapSlot) -> bool {
        let released = self.slots.with_lock(|s| {
            let occupied = slot.index() < s.occupied.len() && s.occupied.is_set(slot.index());
            if occupied {
                s.occupied.clear(slot.index());
                s.claimed.clear(slot.index());
            }
            occupied
        });

        if released {
            trace!("swap: released slot {slot}");
        } else {
            warn!("swap: release of slot {slot} which is not occupied");
        }
        released
    }

    #[must_use]
    pub fn is_occupied(&self, slot: SwapSlot) -> bool {
        self.slots
            .with_lock(|s| slot.index() < s.occupied.len() && s.occupied.is_set(slot.index()))
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.with_lock(|s| s.occupied.count_set())
    }

    /// Slots reserved by a page-out whose write has not completed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots
            .with_lock(|s| s.claimed.count_set() - s.occupied.count_set())
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slots.with_lock(|s| s.claimed.count_clear())
    }

    /// Every occupied slot, in ascending order.
    #[must_use]
    pub fn occupied_slots(&self) -> alloc::vec::Vec<SwapSlot> {
        self.slots
            .with_lock(|s| s.occupied.iter_set().map(SwapSlot::from_index).collect())
    }
}

impl fmt::Debug for SwapSlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapSlotAllocator")
            .field("capacity", &self.capacity())
            .field("occupied", &self.occupied_count())
            .finish_non_exhaustive()
    }
}
