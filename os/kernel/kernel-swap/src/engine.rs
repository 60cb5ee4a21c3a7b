//! Page-out and page-in.
//!
//! A page-out moves a page through these steps, each under at most one
//! structural lock and none held across backing-store I/O:
//!
//! 1. pick a victim on the resident list (it stays listed),
//! 2. reserve a swap slot (pending),
//! 3. copy the page out through the MMU and write it to the slot,
//! 4. commit the slot (occupied),
//! 5. record the swap entry,
//! 6. unregister the resident page,
//! 7. unmap it and hand its frame to the caller.
//!
//! Any failure before step 7 completes undoes the earlier steps in reverse, so
//! the page stays resident and mapped. A crash between steps leaves at worst
//! an occupied slot without an entry, or an entry for a page that is still
//! resident; [`SwapEngine::check_consistency`] repairs both.

use crate::config::{SwapConfig, slots_in};
use crate::page::{PageKey, ResidentPage};
use crate::resident::ResidentPageList;
use crate::slots::{SwapSlot, SwapSlotAllocator};
use crate::stats::SwapStats;
use crate::store::{BackingStore, IoError};
use crate::table::{SwapEntry, SwapPageTable};
use crate::SwapError;
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, PAGE_SIZE_USIZE, PhysicalAddress};
use kernel_vmem::{Mmu, PageBuffer};
use log::{debug, error, info, warn};

/// What a [`check_consistency`](SwapEngine::check_consistency) pass repaired.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Occupied slots no swap entry referred to; released.
    pub orphan_slots: usize,
    /// Swap entries whose slot was not occupied; dropped, the page is lost.
    pub dangling_entries: usize,
    /// Swap entries for pages that are still resident; dropped together with
    /// their slot, the resident copy wins.
    pub resident_duplicates: usize,
}

impl ConsistencyReport {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.orphan_slots == 0 && self.dangling_entries == 0 && self.resident_duplicates == 0
    }
}

/// The swap structures and the backing store they describe.
pub struct SwapEngine<S> {
    slots: SwapSlotAllocator,
    resident: ResidentPageList,
    table: SwapPageTable,
    store: S,
    stats: SwapStats,
}

impl<S: BackingStore> SwapEngine<S> {
    /// # Errors
    /// [`SwapError::StoreTooSmall`] if `store` cannot hold
    /// `config.slot_count` pages.
    pub fn new(store: S, config: &SwapConfig) -> Result<Self, SwapError> {
        let available = slots_in(store.len());
        if config.slot_count > available {
            return Err(SwapError::StoreTooSmall {
                requested: config.slot_count,
                available,
            });
        }

        info!(
            "swap: {} slots ({} KiB) in a {} KiB store",
            config.slot_count,
            config.slot_count as u64 * PAGE_SIZE / 1024,
            store.len() / 1024
        );

        Ok(Self {
            slots: SwapSlotAllocator::new(config.slot_count),
            resident: ResidentPageList::new(),
            table: SwapPageTable::new(),
            store,
            stats: SwapStats::new(),
        })
    }

    #[must_use]
    pub const fn slots(&self) -> &SwapSlotAllocator {
        &self.slots
    }

    #[must_use]
    pub const fn resident(&self) -> &ResidentPageList {
        &self.resident
    }

    #[must_use]
    pub const fn table(&self) -> &SwapPageTable {
        &self.table
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn stats(&self) -> &SwapStats {
        &self.stats
    }

    /// Evicts one resident page to the swap file and returns the frame that
    /// backed it.
    ///
    /// The frame stays marked allocated in the frame allocator; it now belongs
    /// to the caller, who either reuses it or releases it.
    ///
    /// # Errors
    /// Victim selection, slot, I/O, bookkeeping and MMU failures. In every
    /// case the victim is still resident and mapped afterwards, unless
    /// [`SwapError::VictimLost`] reports that its owner released it
    /// concurrently.
    pub fn page_out<M: Mmu + ?Sized>(&self, mmu: &M) -> Result<PhysicalAddress, SwapError> {
        let result = self.try_page_out(mmu);
        if let Err(e) = &result {
            self.stats.record_failed_page_out();
            debug!("swap: page-out failed: {e}");
        }
        result
    }

    fn try_page_out<M: Mmu + ?Sized>(&self, mmu: &M) -> Result<PhysicalAddress, SwapError> {
        let chosen = self.resident.select_victim(mmu)?;
        self.stats.record_scan(chosen.scanned);
        let victim = chosen.page;
        let key = victim.key();

        let slot = self.slots.reserve()?;
        if let Err(e) = self.write_victim(mmu, &victim, slot) {
            self.slots.abort(slot);
            warn!("swap: cannot write {key} to slot {slot}: {e}");
            return Err(e);
        }
        self.slots.commit(slot);

        let entry = SwapEntry::new(victim.owner, victim.virtual_address, slot);
        if let Err(e) = self.table.insert(entry) {
            self.slots.release(slot);
            // Another page-out picked the same victim and got there first.
            return Err(match e {
                SwapError::AlreadySwapped(_) => SwapError::VictimLost(key),
                e => e,
            });
        }

        // The page may have been evicted by someone else and brought back
        // while this copy was written; that copy is stale.
        if self.resident.remove_victim(&chosen).is_err() {
            self.forget(key, slot);
            return Err(SwapError::VictimLost(key));
        }

        if let Err(e) = mmu.unmap(victim.owner.root, victim.virtual_address, PAGE_SIZE) {
            if let Err(relist) = self.resident.insert(victim) {
                error!("swap: cannot relist {key} after failed unmap: {relist}");
            }
            self.forget(key, slot);
            return Err(e.into());
        }

        self.stats.record_page_out();
        debug!(
            "swap: paged out {key} from {} to slot {slot}",
            victim.physical
        );
        Ok(victim.physical)
    }

    fn write_victim<M: Mmu + ?Sized>(
        &self,
        mmu: &M,
        victim: &ResidentPage,
        slot: SwapSlot,
    ) -> Result<(), SwapError> {
        let mut page = page_buffer()?;
        mmu.read_page(victim.owner.root, victim.virtual_address, &mut page)?;
        let written = self.store.write_at(slot.offset(), page.as_slice())?;
        if written != PAGE_SIZE_USIZE {
            return Err(IoError::ShortTransfer {
                done: written,
                expected: PAGE_SIZE_USIZE,
            }
            .into());
        }
        Ok(())
    }

    /// Undoes steps 4 and 5 of a page-out.
    fn forget(&self, key: PageKey, slot: SwapSlot) {
        if let Err(e) = self.table.delete(key) {
            error!("swap: cannot roll back entry of {key}: {e}");
        }
        self.slots.release(slot);
    }

    /// Copies the contents of `entry`'s slot into its page.
    ///
    /// The page must already be mapped to a fresh frame. The swap entry and
    /// its slot are left as they are; the caller deletes and releases them
    /// once the page is resident again.
    ///
    /// # Errors
    /// - [`SwapError::InvalidOffset`] or [`SwapError::SlotNotOccupied`] for a
    ///   stale or corrupt entry.
    /// - [`SwapError::Io`] if the store cannot deliver the page.
    /// - [`SwapError::Mmu`] if the page is not mapped.
    pub fn page_in<M: Mmu + ?Sized>(&self, mmu: &M, entry: &SwapEntry) -> Result<(), SwapError> {
        let slot = entry
            .slot()
            .ok_or(SwapError::InvalidOffset(entry.offset))?;
        if !self.slots.is_occupied(slot) {
            return Err(SwapError::SlotNotOccupied(slot));
        }

        let mut page = page_buffer()?;
        let read = self.store.read_at(slot.offset(), page.as_mut_slice())?;
        if read != PAGE_SIZE_USIZE {
            return Err(IoError::ShortTransfer {
                done: read,
                expected: PAGE_SIZE_USIZE,
            }
            .into());
        }
        mmu.write_page(entry.owner.root, entry.virtual_address, &page)?;

        self.stats.record_page_in();
        debug!("swap: paged in {} from slot {slot}", entry.key());
        Ok(())
    }

    /// Brings the slot bitmap, the swap page table and the resident list back
    /// into agreement after an interrupted page-out.
    ///
    /// Meant for recovery time; concurrent page-outs would be seen half done
    /// and repaired away.
    pub fn check_consistency(&self) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();
        let mut referenced = BTreeSet::new();

        for entry in self.table.entries() {
            let key = entry.key();
            let slot = entry.slot().filter(|&s| self.slots.is_occupied(s));

            if self.resident.contains(key) {
                if let Err(e) = self.table.delete(key) {
                    error!("swap: cannot drop swap entry of resident page {key}: {e}");
                    continue;
                }
                if let Some(slot) = slot {
                    self.slots.release(slot);
                }
                report.resident_duplicates += 1;
                debug!("swap: dropped swap entry of resident page {key}");
                continue;
            }

            match slot {
                Some(slot) if referenced.insert(slot) => {}
                _ => {
                    if let Err(e) = self.table.delete(key) {
                        error!("swap: cannot drop dangling entry of {key}: {e}");
                        continue;
                    }
                    report.dangling_entries += 1;
                    warn!(
                        "swap: dropped {key}, its copy at offset {:#x} is gone",
                        entry.offset
                    );
                }
            }
        }

        let orphans: Vec<SwapSlot> = self
            .slots
            .occupied_slots()
            .into_iter()
            .filter(|slot| !referenced.contains(slot))
            .collect();
        for slot in orphans {
            self.slots.release(slot);
            report.orphan_slots += 1;
            debug!("swap: released orphan slot {slot}");
        }

        if !report.is_clean() {
            info!("swap: consistency check repaired {report:?}");
        }
        report
    }
}

impl<S> core::fmt::Debug for SwapEngine<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SwapEngine")
            .field("slots", &self.slots)
            .field("resident", &self.resident)
            .field("table", &self.table)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

/// A zeroed page buffer on the heap, without aborting on allocation failure.
fn page_buffer() -> Result<Box<PageBuffer>, SwapError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(PAGE_SIZE_USIZE)
        .map_err(|_| SwapError::BookkeepingAllocation)?;
    bytes.resize(PAGE_SIZE_USIZE, 0u8);
    bytes
        .into_boxed_slice()
        .try_into()
        .map_err(|_| SwapError::BookkeepingAllocation)
}
