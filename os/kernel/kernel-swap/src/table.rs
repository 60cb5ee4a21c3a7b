//! The swap page table: where the only copy of each evicted page lives.
//!
//! Entries are stored in a dense arena with a free list of reclaimed indices;
//! a key index over `(process, page)` makes lookups logarithmic instead of
//! walking every swapped page.

use crate::SwapError;
use crate::page::{PageKey, PageOwner, ProcessId};
use crate::slots::SwapSlot;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::SpinLock;
use log::trace;

/// A page whose contents are in the swap file and nowhere else.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapEntry {
    pub owner: PageOwner,
    pub virtual_address: VirtualAddress,
    /// Byte offset of the page in the swap file.
    pub offset: u64,
}

impl SwapEntry {
    #[must_use]
    pub const fn new(owner: PageOwner, va: VirtualAddress, slot: SwapSlot) -> Self {
        Self {
            owner,
            virtual_address: va.align_down(),
            offset: slot.offset(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> PageKey {
        PageKey::new(self.owner.pid, self.virtual_address)
    }

    /// The slot at [`offset`](Self::offset), if the offset is slot-aligned.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> Option<SwapSlot> {
        SwapSlot::from_offset(self.offset)
    }
}

#[derive(Default)]
struct Table {
    entries: Vec<Option<SwapEntry>>,
    free: Vec<usize>,
    index: BTreeMap<PageKey, usize>,
}

impl Table {
    fn insert(&mut self, entry: SwapEntry) -> Result<(), SwapError> {
        let key = entry.key();
        if self.index.contains_key(&key) {
            return Err(SwapError::AlreadySwapped(key));
        }

        let position = if let Some(position) = self.free.pop() {
            self.entries[position] = Some(entry);
            position
        } else {
            self.entries
                .try_reserve(1)
                .and_then(|()| self.free.try_reserve(self.entries.len() + 1))
                .map_err(|_| SwapError::BookkeepingAllocation)?;
            self.entries.push(Some(entry));
            self.entries.len() - 1
        };

        self.index.insert(key, position);
        Ok(())
    }

    fn take(&mut self, key: PageKey) -> Option<SwapEntry> {
        let position = self.index.remove(&key)?;
        let entry = self.entries[position].take();
        self.free.push(position);
        entry
    }

    fn get(&self, key: PageKey) -> Option<SwapEntry> {
        self.index
            .get(&key)
            .and_then(|&position| self.entries[position])
    }
}

/// Table of swapped-out pages keyed by owning process and virtual address.
pub struct SwapPageTable {
    table: SpinLock<Table>,
}

impl Default for SwapPageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapPageTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: SpinLock::named("swap page table", Table::default()),
        }
    }

    /// Records that the page of `entry` now lives at `entry.offset`.
    ///
    /// # Errors
    /// - [`SwapError::AlreadySwapped`] if the page already has an entry.
    /// - [`SwapError::BookkeepingAllocation`] if the entry cannot be allocated.
    pub fn insert(&self, entry: SwapEntry) -> Result<(), SwapError> {
        self.table.with_lock(|t| t.insert(entry))?;
        trace!("spt: + {} at offset {:#x}", entry.key(), entry.offset);
        Ok(())
    }

    /// # Errors
    /// [`SwapError::NotSwapped`] if the page has no entry.
    pub fn search(&self, key: PageKey) -> Result<SwapEntry, SwapError> {
        self.table
            .with_lock(|t| t.get(key))
            .ok_or(SwapError::NotSwapped(key))
    }

    /// Removes and returns the entry of `key`.
    ///
    /// # Errors
    /// [`SwapError::NotSwapped`] if the page has no entry.
    pub fn delete(&self, key: PageKey) -> Result<SwapEntry, SwapError> {
        let entry = self
            .table
            .with_lock(|t| t.take(key))
            .ok_or(SwapError::NotSwapped(key))?;
        trace!("spt: - {key} at offset {:#x}", entry.offset);
        Ok(entry)
    }

    #[must_use]
    pub fn contains(&self, key: PageKey) -> bool {
        self.table.with_lock(|t| t.index.contains_key(&key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.with_lock(|t| t.index.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by process and virtual address.
    #[must_use]
    pub fn entries(&self) -> Vec<SwapEntry> {
        self.table.with_lock(|t| {
            t.index
                .values()
                .filter_map(|&position| t.entries[position])
                .collect()
        })
    }

    /// Removes every entry of `pid`.
    pub fn remove_process(&self, pid: ProcessId) -> Vec<SwapEntry> {
        let (first, last) = PageKey::process_bounds(pid);
        self.table.with_lock(|t| {
            let keys: Vec<PageKey> = t.index.range(first..=last).map(|(&k, _)| k).collect();
            keys.into_iter().filter_map(|key| t.take(key)).collect()
        })
    }
}

impl core::fmt::Debug for SwapPageTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SwapPageTable")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::AddressSpaceRoot;

    fn entry(pid: u32, va: u64, slot: u32) -> SwapEntry {
        SwapEntry::new(
            PageOwner::new(ProcessId::new(pid), AddressSpaceRoot::new(0x1000)),
            VirtualAddress::new(va),
            SwapSlot::new(slot),
        )
    }

    #[test]
    fn positions_are_recycled() {
        let mut t = Table::default();
        t.insert(entry(1, 0x1000, 0)).unwrap();
        t.insert(entry(1, 0x2000, 1)).unwrap();
        assert!(t.take(entry(1, 0x1000, 0).key()).is_some());
        t.insert(entry(2, 0x1000, 2)).unwrap();
        assert_eq!(t.entries.len(), 2);
        assert_eq!(t.get(entry(2, 0x1000, 2).key()), Some(entry(2, 0x1000, 2)));
    }

    #[test]
    fn entry_slot_round_trips_through_the_offset() {
        let e = entry(1, 0x1234, 5);
        assert_eq!(e.offset, 5 * 0x1000);
        assert_eq!(e.slot(), Some(SwapSlot::new(5)));
        assert_eq!(e.virtual_address, VirtualAddress::new(0x1000));

        let odd = SwapEntry { offset: 0x10, ..e };
        assert_eq!(odd.slot(), None);
    }
}
