//! A software MMU over simulated physical memory.
//!
//! Translations are kept per address space as [`PageEntryBits`] keyed by
//! virtual page number; physical memory is a sparse map from frame number to
//! a page of bytes that persists across unmap/remap, just like real RAM. The
//! `touch`/`write_user`/`read_user` helpers stand in for a user process
//! accessing its memory: they go through the translation and set the
//! accessed (and dirty) bits the way the CPU would.

use crate::{AddressSpaceRoot, Mmu, MmuError, PageBuffer, PageEntryBits};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_memory_addresses::{PAGE_SIZE, PAGE_SIZE_USIZE, PhysicalAddress, VirtualAddress, pages_for};
use kernel_sync::SpinLock;
use log::trace;

#[derive(Default)]
struct SoftState {
    entries: BTreeMap<(AddressSpaceRoot, usize), PageEntryBits>,
    frames: BTreeMap<usize, Box<PageBuffer>>,
}

impl SoftState {
    fn entry(&self, root: AddressSpaceRoot, va: VirtualAddress) -> Result<PageEntryBits, MmuError> {
        self.entries
            .get(&(root, va.page_index()))
            .copied()
            .filter(|e| e.present())
            .ok_or(MmuError::NotMapped { root, va })
    }

    fn entry_mut(
        &mut self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
    ) -> Result<&mut PageEntryBits, MmuError> {
        self.entries
            .get_mut(&(root, va.page_index()))
            .filter(|e| e.present())
            .ok_or(MmuError::NotMapped { root, va })
    }

    fn frame_mut(&mut self, pa: PhysicalAddress) -> &mut PageBuffer {
        self.frames
            .entry(pa.frame_index())
            .or_insert_with(|| Box::new([0; PAGE_SIZE_USIZE]))
    }
}

/// Software implementation of [`Mmu`].
pub struct SoftMmu {
    fail_transfers: AtomicBool,
    state: SpinLock<SoftState>,
}

impl Default for SoftMmu {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SoftMmu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftMmu")
            .field("mapped_pages", &self.mapped_pages())
            .finish_non_exhaustive()
    }
}

impl SoftMmu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail_transfers: AtomicBool::new(false),
            state: SpinLock::named("soft mmu", SoftState::default()),
        }
    }

    /// Makes every subsequent [`read_page`](Mmu::read_page) and
    /// [`write_page`](Mmu::write_page) fail, for fault-injection tests.
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::Relaxed);
    }

    /// Physical frame backing `va` in `root`, if mapped.
    #[must_use]
    pub fn translate(&self, root: AddressSpaceRoot, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.state
            .with_lock(|s| s.entry(root, va).ok())
            .map(|e| e.physical_address() + va.page_offset())
    }

    /// Whether `va` has a present translation in `root`.
    #[must_use]
    pub fn is_mapped(&self, root: AddressSpaceRoot, va: VirtualAddress) -> bool {
        self.translate(root, va).is_some()
    }

    /// Raw page-table entry for `va` in `root`.
    #[must_use]
    pub fn entry(&self, root: AddressSpaceRoot, va: VirtualAddress) -> Option<PageEntryBits> {
        self.state.with_lock(|s| s.entry(root, va).ok())
    }

    /// Number of present translations across all address spaces.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.state
            .with_lock(|s| s.entries.values().filter(|e| e.present()).count())
    }

    /// A user-mode read of one byte at `va`; sets the accessed bit.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page is not present.
    pub fn touch(&self, root: AddressSpaceRoot, va: VirtualAddress) -> Result<u8, MmuError> {
        self.read_user(root, va, 1).map(|bytes| bytes[0])
    }

    /// A user-mode read of `len` bytes starting at `va`, within one page.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page is not present,
    /// [`MmuError::RangeOverflow`] if the read crosses the page end.
    pub fn read_user(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        len: usize,
    ) -> Result<Vec<u8>, MmuError> {
        let offset = in_page_range(va, len)?;
        let mut state = self.state.lock();
        let entry = state.entry_mut(root, va)?;
        entry.set_accessed(true);
        let frame = entry.physical_address();
        Ok(state.frame_mut(frame)[offset..offset + len].to_vec())
    }

    /// A user-mode write of `bytes` starting at `va`, within one page; sets
    /// the accessed and dirty bits.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page is not present,
    /// [`MmuError::RangeOverflow`] if the write crosses the page end.
    pub fn write_user(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        bytes: &[u8],
    ) -> Result<(), MmuError> {
        let offset = in_page_range(va, bytes.len())?;
        let mut state = self.state.lock();
        let entry = state.entry_mut(root, va)?;
        entry.set_accessed(true);
        entry.set_dirty(true);
        let frame = entry.physical_address();
        state.frame_mut(frame)[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn transfer_allowed(&self) -> Result<(), MmuError> {
        if self.fail_transfers.load(Ordering::Relaxed) {
            Err(MmuError::TransferFailed)
        } else {
            Ok(())
        }
    }
}

impl Mmu for SoftMmu {
    fn query_accessed(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        clear: bool,
    ) -> Result<bool, MmuError> {
        self.state.with_lock(|s| {
            let entry = s.entry_mut(root, va)?;
            let accessed = entry.accessed();
            if clear {
                entry.set_accessed(false);
            }
            Ok(accessed)
        })
    }

    fn map(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
    ) -> Result<(), MmuError> {
        if !va.is_page_aligned() {
            return Err(MmuError::UnalignedVirtual(va));
        }
        if !pa.is_page_aligned() {
            return Err(MmuError::UnalignedPhysical(pa));
        }

        let pages = pages_for(len);
        let span = pages.checked_mul(PAGE_SIZE).ok_or(MmuError::RangeOverflow)?;
        va.checked_add(span).ok_or(MmuError::RangeOverflow)?;
        pa.as_u64().checked_add(span).ok_or(MmuError::RangeOverflow)?;

        let mut state = self.state.lock();
        for i in 0..pages {
            let page = va + i * PAGE_SIZE;
            if state.entry(root, page).is_ok() {
                return Err(MmuError::AlreadyMapped { root, va: page });
            }
        }

        for i in 0..pages {
            let page = va + i * PAGE_SIZE;
            let frame = pa + i * PAGE_SIZE;
            state
                .entries
                .insert((root, page.page_index()), PageEntryBits::leaf(frame, true));
        }
        drop(state);

        trace!("soft mmu: mapped {va} -> {pa} ({pages} page(s)) in {root}");
        Ok(())
    }

    fn unmap(&self, root: AddressSpaceRoot, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        if !va.is_page_aligned() {
            return Err(MmuError::UnalignedVirtual(va));
        }

        let pages = pages_for(len);
        let span = pages.checked_mul(PAGE_SIZE).ok_or(MmuError::RangeOverflow)?;
        va.checked_add(span).ok_or(MmuError::RangeOverflow)?;

        let mut state = self.state.lock();
        for i in 0..pages {
            state.entry(root, va + i * PAGE_SIZE)?;
        }
        for i in 0..pages {
            state.entries.remove(&(root, (va + i * PAGE_SIZE).page_index()));
        }
        drop(state);

        trace!("soft mmu: unmapped {va} ({pages} page(s)) in {root}");
        Ok(())
    }

    fn read_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &mut PageBuffer,
    ) -> Result<(), MmuError> {
        self.transfer_allowed()?;
        let mut state = self.state.lock();
        let frame = state.entry(root, va)?.physical_address();
        buf.copy_from_slice(state.frame_mut(frame).as_slice());
        Ok(())
    }

    fn write_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &PageBuffer,
    ) -> Result<(), MmuError> {
        self.transfer_allowed()?;
        let mut state = self.state.lock();
        let frame = state.entry(root, va)?.physical_address();
        state.frame_mut(frame).copy_from_slice(buf.as_slice());
        Ok(())
    }
}

/// In-page offset of `va`, provided `len` bytes from there stay in the page.
fn in_page_range(va: VirtualAddress, len: usize) -> Result<usize, MmuError> {
    #[allow(clippy::cast_possible_truncation)]
    let offset = va.page_offset() as usize;
    if offset + len > PAGE_SIZE_USIZE {
        return Err(MmuError::RangeOverflow);
    }
    Ok(offset)
}
