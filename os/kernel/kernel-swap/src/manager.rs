//! The memory manager context object.

use crate::config::SwapConfig;
use crate::engine::{ConsistencyReport, SwapEngine};
use crate::page::{PageKey, PageOwner, ProcessId, ResidentPage};
use crate::stats::SwapStatsSnapshot;
use crate::store::BackingStore;
use crate::table::SwapEntry;
use crate::SwapError;
use kernel_alloc::{FrameAllocError, MemoryLayout, PhysicalMemory};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_vmem::{Mmu, MmuError, PageBuffer};
use log::{debug, info, warn};

/// Pages dropped by [`MemoryManager::discard_process`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DiscardedPages {
    pub resident: usize,
    pub swapped: usize,
}

/// What was still in use when the manager was torn down.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MemoryUsage {
    pub allocated_frames: usize,
    pub resident_pages: usize,
    pub swapped_pages: usize,
    pub occupied_slots: usize,
}

/// The physical memory manager, the MMU and the swap engine, bundled.
///
/// There is exactly one per kernel. It is built once at boot and passed by
/// reference to whoever needs it; it is never copied, so every caller goes
/// through the same locks. All operations take `&self`.
pub struct MemoryManager<M, S> {
    pmm: PhysicalMemory,
    mmu: M,
    engine: SwapEngine<S>,
    config: SwapConfig,
}

impl<M: Mmu, S: BackingStore> MemoryManager<M, S> {
    /// # Errors
    /// [`SwapError::StoreTooSmall`] if `store` cannot hold the configured
    /// number of slots.
    pub fn new(pmm: PhysicalMemory, mmu: M, store: S, config: SwapConfig) -> Result<Self, SwapError> {
        let engine = SwapEngine::new(store, &config)?;
        info!(
            "memory manager: {} of {} frames free, {} swap slots",
            pmm.free_frames(),
            pmm.frame_count(),
            config.slot_count
        );
        Ok(Self {
            pmm,
            mmu,
            engine,
            config,
        })
    }

    #[must_use]
    pub const fn pmm(&self) -> &PhysicalMemory {
        &self.pmm
    }

    #[must_use]
    pub const fn mmu(&self) -> &M {
        &self.mmu
    }

    #[must_use]
    pub const fn engine(&self) -> &SwapEngine<S> {
        &self.engine
    }

    #[must_use]
    pub const fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// The fixed scalars of the physical memory state.
    #[must_use]
    pub const fn layout(&self) -> MemoryLayout {
        self.pmm.layout()
    }

    #[must_use]
    pub fn stats(&self) -> SwapStatsSnapshot {
        self.engine.stats().snapshot()
    }

    /// See [`PhysicalMemory::reserve_frames`].
    ///
    /// # Errors
    /// [`FrameAllocError`] if no such run of frames is free.
    pub fn reserve_frames(
        &self,
        count: usize,
        min_address: Option<PhysicalAddress>,
    ) -> Result<PhysicalAddress, FrameAllocError> {
        self.pmm.reserve_frames(count, min_address)
    }

    /// See [`PhysicalMemory::release_frames`].
    pub fn release_frames(&self, start: PhysicalAddress, count: usize) {
        self.pmm.release_frames(start, count);
    }

    /// See [`SwapEngine::page_out`].
    ///
    /// # Errors
    /// As [`SwapEngine::page_out`].
    pub fn page_out(&self) -> Result<PhysicalAddress, SwapError> {
        self.engine.page_out(&self.mmu)
    }

    /// See [`SwapEngine::page_in`].
    ///
    /// # Errors
    /// As [`SwapEngine::page_in`].
    pub fn page_in(&self, entry: &SwapEntry) -> Result<(), SwapError> {
        self.engine.page_in(&self.mmu, entry)
    }

    /// Makes `page` an eviction candidate.
    ///
    /// # Errors
    /// [`SwapError::AlreadyResident`] or [`SwapError::BookkeepingAllocation`].
    pub fn register_resident_page(&self, page: ResidentPage) -> Result<(), SwapError> {
        self.engine.resident().insert(page)
    }

    /// Removes the page at `va` of `pid` from the eviction candidates, e.g.
    /// before pinning it.
    ///
    /// # Errors
    /// [`SwapError::NotResident`] if it is not registered.
    pub fn unregister_resident_page(
        &self,
        pid: ProcessId,
        va: VirtualAddress,
    ) -> Result<ResidentPage, SwapError> {
        self.engine.resident().remove(PageKey::new(pid, va))
    }

    /// # Errors
    /// [`SwapError::NotSwapped`] if the page has no swap entry.
    pub fn lookup_swap_entry(&self, pid: ProcessId, va: VirtualAddress) -> Result<SwapEntry, SwapError> {
        self.engine.table().search(PageKey::new(pid, va))
    }

    /// Reserves one frame, evicting a resident page if physical memory is
    /// exhausted.
    ///
    /// # Errors
    /// - [`SwapError::Frames`] if no frame is free and nothing could be
    ///   evicted because no page is resident.
    /// - Any non-transient page-out failure.
    pub fn reserve_frame_or_evict(&self) -> Result<PhysicalAddress, SwapError> {
        let out_of_frames = match self.pmm.reserve_frames(1, None) {
            Ok(frame) => return Ok(frame),
            Err(e) => e,
        };

        let mut last = SwapError::Frames(out_of_frames);
        for attempt in 0..=self.config.victim_retries {
            match self.engine.page_out(&self.mmu) {
                Ok(frame) => return Ok(frame),
                Err(SwapError::NoResidentPages) => return Err(SwapError::Frames(out_of_frames)),
                Err(e) if e.is_transient() => {
                    debug!("memory manager: eviction attempt {attempt} lost its victim: {e}");
                    last = e;
                }
                Err(e) => return Err(e),
            }

            // A released victim may have freed a frame by itself.
            if let Ok(frame) = self.pmm.reserve_frames(1, None) {
                return Ok(frame);
            }
        }
        Err(last)
    }

    /// Backs `va` in `owner`'s address space with a zeroed frame and makes it
    /// swappable. Returns the frame.
    ///
    /// # Errors
    /// - [`SwapError::AlreadySwapped`] / [`SwapError::AlreadyResident`] if
    ///   the page is already known.
    /// - Frame reservation, MMU or bookkeeping failures; nothing is left
    ///   mapped or reserved in that case.
    pub fn map_swappable_page(&self, owner: PageOwner, va: VirtualAddress) -> Result<PhysicalAddress, SwapError> {
        if !va.is_page_aligned() {
            return Err(MmuError::UnalignedVirtual(va).into());
        }
        let key = PageKey::new(owner.pid, va);
        if self.engine.table().contains(key) {
            return Err(SwapError::AlreadySwapped(key));
        }
        if self.engine.resident().contains(key) {
            return Err(SwapError::AlreadyResident(key));
        }

        let frame = self.reserve_frame_or_evict()?;
        if let Err(e) = self.mmu.map(owner.root, va, frame, PAGE_SIZE) {
            self.pmm.release_frames(frame, 1);
            return Err(e.into());
        }
        if let Err(e) = self.mmu.write_page(owner.root, va, &ZERO_PAGE) {
            self.unmap_and_release(owner, va, frame);
            return Err(e.into());
        }

        if let Err(e) = self.register_resident_page(ResidentPage::new(frame, va, owner)) {
            self.unmap_and_release(owner, va, frame);
            return Err(e);
        }

        debug!("memory manager: mapped {key} at {frame}");
        Ok(frame)
    }

    /// Brings a swapped page back: reserves (or evicts for) a frame, maps it,
    /// reads the page from the swap file, then drops the swap entry and slot
    /// and lists the page as resident again. Returns the new frame.
    ///
    /// # Errors
    /// - [`SwapError::NotSwapped`] if the page has no swap entry.
    /// - Frame, MMU and I/O failures. The page then stays swapped and no
    ///   frame is held; an I/O failure means the faulting process cannot be
    ///   resumed.
    pub fn swap_in(&self, pid: ProcessId, va: VirtualAddress) -> Result<PhysicalAddress, SwapError> {
        let key = PageKey::new(pid, va);
        let entry = self.engine.table().search(key)?;

        let owner = entry.owner;
        let va = entry.virtual_address;

        let frame = self.reserve_frame_or_evict()?;
        if let Err(e) = self.mmu.map(owner.root, va, frame, PAGE_SIZE) {
            self.pmm.release_frames(frame, 1);
            return Err(e.into());
        }

        if let Err(e) = self.engine.page_in(&self.mmu, &entry) {
            self.unmap_and_release(owner, va, frame);
            return Err(e);
        }

        // The owner may have released the page while it was being read.
        if let Err(e) = self.engine.table().delete(key) {
            self.unmap_and_release(owner, va, frame);
            return Err(e);
        }
        if let Some(slot) = entry.slot() {
            self.engine.slots().release(slot);
        }

        if let Err(e) = self.register_resident_page(ResidentPage::new(frame, va, owner)) {
            self.unmap_and_release(owner, va, frame);
            return Err(e);
        }

        debug!("memory manager: swapped in {key} at {frame}");
        Ok(frame)
    }

    /// Frees the page at `va` of `owner`, wherever it currently lives.
    ///
    /// # Errors
    /// [`SwapError::UnknownPage`] if the page is neither resident nor
    /// swapped.
    pub fn release_page(&self, owner: PageOwner, va: VirtualAddress) -> Result<(), SwapError> {
        let key = PageKey::new(owner.pid, va);

        if let Ok(page) = self.engine.resident().remove(key) {
            self.unmap_and_release(page.owner, page.virtual_address, page.physical);
            return Ok(());
        }

        if let Ok(entry) = self.engine.table().delete(key) {
            if let Some(slot) = entry.slot() {
                self.engine.slots().release(slot);
            }
            return Ok(());
        }

        Err(SwapError::UnknownPage(key))
    }

    /// Drops every resident and swapped page of `pid`, e.g. on process exit.
    pub fn discard_process(&self, pid: ProcessId) -> DiscardedPages {
        let resident = self.engine.resident().remove_process(pid);
        for page in &resident {
            self.unmap_and_release(page.owner, page.virtual_address, page.physical);
        }

        let swapped = self.engine.table().remove_process(pid);
        for slot in swapped.iter().filter_map(SwapEntry::slot) {
            self.engine.slots().release(slot);
        }

        let discarded = DiscardedPages {
            resident: resident.len(),
            swapped: swapped.len(),
        };
        debug!("memory manager: discarded {discarded:?} of process {pid}");
        discarded
    }

    /// See [`SwapEngine::check_consistency`].
    pub fn check_consistency(&self) -> ConsistencyReport {
        self.engine.check_consistency()
    }

    /// Tears the manager down and reports what was still in use.
    pub fn deinit(self) -> MemoryUsage {
        let usage = MemoryUsage {
            allocated_frames: self.pmm.allocated_frames(),
            resident_pages: self.engine.resident().len(),
            swapped_pages: self.engine.table().len(),
            occupied_slots: self.engine.slots().occupied_count(),
        };

        if usage.resident_pages != 0 || usage.swapped_pages != 0 || usage.occupied_slots != 0 {
            warn!("memory manager: torn down with pages still in use: {usage:?}");
        }
        info!("memory manager: deinitialized, {usage:?}");
        usage
    }

    fn unmap_and_release(&self, owner: PageOwner, va: VirtualAddress, frame: PhysicalAddress) {
        if let Err(e) = self.mmu.unmap(owner.root, va, PAGE_SIZE) {
            warn!("memory manager: {va} of {} was not mapped: {e}", owner.pid);
        }
        self.pmm.release_frames(frame, 1);
    }
}

impl<M, S> core::fmt::Debug for MemoryManager<M, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("pmm", &self.pmm)
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static ZERO_PAGE: PageBuffer = [0; kernel_memory_addresses::PAGE_SIZE_USIZE];
