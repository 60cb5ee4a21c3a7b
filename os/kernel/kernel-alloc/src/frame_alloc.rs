//! Bitmap-based physical frame allocator.
//!
//! One bit per 4 KiB frame up to the highest physical address the firmware
//! reports; `1` = allocated, `0` = free. The bitmap lives behind the
//! allocation lock and is only ever touched inside its critical section.

use crate::bitmap::Bitmap;
use crate::config::PmmConfig;
use crate::error::{FrameAllocError, PmmInitError};
use core::ops::Range;
use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::SpinLock;
use log::{error, info, trace, warn};

/// The fixed scalars of the physical memory state.
///
/// These are computed once from the firmware memory map and never change, so
/// handing out copies is safe; the lock-guarded bitmap is never part of it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    /// End of the highest usable (non-reserved) region.
    pub highest_available: PhysicalAddress,
    /// End of the highest region reported at all, reserved memory included.
    /// Always `>= highest_available`.
    pub highest_present: PhysicalAddress,
    /// Total usable bytes above the low-memory limit.
    pub physical_memory_size: u64,
    /// Number of frames covered by the bitmap.
    pub frame_count: usize,
}

/// The physical memory manager.
///
/// Construct it once during boot with [`init`](Self::init) and share it by
/// reference; it is `Sync` and every mutation goes through the allocation
/// lock.
#[derive(Debug)]
pub struct PhysicalMemory {
    layout: MemoryLayout,
    region_counts: [u32; MemoryRegionType::COUNT],
    allocation: SpinLock<Bitmap>,
}

impl PhysicalMemory {
    /// Builds the frame bitmap from the firmware memory map.
    ///
    /// Frames covered by a usable region start out free. Everything else
    /// (reserved regions, holes between regions, the kernel image and, when
    /// configured, low memory) starts out allocated. Where a reserved region
    /// overlaps a usable one, the reserved classification wins. Regions that
    /// end inside the last frame of the address space are ignored with a
    /// warning, so the bitmap never covers a frame without an end boundary.
    ///
    /// Must run before any other thread can reach the allocator.
    ///
    /// # Errors
    /// - [`PmmInitError::EmptyMemoryMap`] if `regions` is empty.
    /// - [`PmmInitError::NoUsableMemory`] if no region is usable.
    /// - [`PmmInitError::BitmapAllocation`] if the bitmap cannot be allocated.
    pub fn init(
        regions: &[MemoryRegion],
        kernel_image: Range<PhysicalAddress>,
        config: &PmmConfig,
    ) -> Result<Self, PmmInitError> {
        if regions.is_empty() {
            return Err(PmmInitError::EmptyMemoryMap);
        }

        let mut region_counts = [0u32; MemoryRegionType::COUNT];
        let mut highest_present = PhysicalAddress::zero();
        let mut highest_available = None;
        let mut physical_memory_size = 0u64;

        for region in regions.iter().filter(|r| !r.is_empty()) {
            if !is_frame_addressable(region) {
                warn!(
                    "PMM: ignoring {:?} region at {} ({:#x} bytes): it ends inside the last frame of the address space",
                    region.kind, region.base, region.length
                );
                continue;
            }

            region_counts[region.kind.index()] += 1;
            highest_present = highest_present.max(region.end());

            if region.kind.is_usable() {
                highest_available = highest_available.max(Some(region.end()));
                physical_memory_size += region.bytes_above(config.low_memory_limit);
            }
        }

        let Some(highest_available) = highest_available else {
            return Err(PmmInitError::NoUsableMemory);
        };

        let frame_count = highest_present.align_up().frame_index();
        let mut bitmap = Bitmap::try_filled(frame_count, true)
            .map_err(|_| PmmInitError::BitmapAllocation { frames: frame_count })?;

        let addressable = || regions.iter().filter(|r| is_frame_addressable(r));

        // Usable regions only contribute whole frames.
        for region in addressable().filter(|r| r.kind.is_usable()) {
            let first = region.base.align_up().frame_index();
            let end = region.end().align_down().frame_index();
            bitmap.clear_range(first..end);
        }

        // Anything touching a non-usable region is taken.
        for region in addressable().filter(|r| !r.kind.is_usable()) {
            bitmap.set_range(frames_touching(region.base, region.end()));
        }

        bitmap.set_range(frames_touching(kernel_image.start, kernel_image.end));

        if config.reserve_low_memory {
            bitmap.set_range(0..frame_index_rounded_up(PhysicalAddress::new(config.low_memory_limit)));
        }

        let layout = MemoryLayout {
            highest_available,
            highest_present,
            physical_memory_size,
            frame_count,
        };

        info!(
            "PMM: {} regions, {} KiB usable above {:#x}, highest available {}, highest present {}, {} of {} frames free",
            regions.len(),
            physical_memory_size / 1024,
            config.low_memory_limit,
            highest_available,
            highest_present,
            bitmap.count_clear(),
            frame_count
        );

        Ok(Self {
            layout,
            region_counts,
            allocation: SpinLock::named("pmm allocation bitmap", bitmap),
        })
    }

    /// Creates an allocator over `frames` frames starting at physical address
    /// zero, all of them free.
    #[must_use]
    pub fn with_free_frames(frames: usize) -> Self {
        let end = PhysicalAddress::from_frame_index(frames);
        let mut region_counts = [0u32; MemoryRegionType::COUNT];
        region_counts[MemoryRegionType::Usable.index()] = 1;

        Self {
            layout: MemoryLayout {
                highest_available: end,
                highest_present: end,
                physical_memory_size: end.as_u64(),
                frame_count: frames,
            },
            region_counts,
            allocation: SpinLock::named("pmm allocation bitmap", Bitmap::new(frames)),
        }
    }

    /// Reserves the first run of `count` contiguous free frames whose start
    /// address is at or above `min_address` (default: search from frame 0).
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroFrames`] if `count` is zero.
    /// - [`FrameAllocError::OutOfFrames`] if no such run exists.
    pub fn reserve_frames(
        &self,
        count: usize,
        min_address: Option<PhysicalAddress>,
    ) -> Result<PhysicalAddress, FrameAllocError> {
        if count == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }

        let min_address = min_address.unwrap_or_default();
        let Some(first) = min_address.checked_align_up().map(PhysicalAddress::frame_index) else {
            return Err(FrameAllocError::OutOfFrames {
                requested: count,
                min_address,
            });
        };

        let start = self.allocation.with_lock(|bitmap| {
            let start = bitmap.first_clear_run(first, count)?;
            bitmap.set_range(start..start + count);
            Some(start)
        });

        match start {
            Some(start) => {
                let pa = PhysicalAddress::from_frame_index(start);
                trace!("PMM: reserved {count} frame(s) at {pa}");
                Ok(pa)
            }
            None => Err(FrameAllocError::OutOfFrames {
                requested: count,
                min_address,
            }),
        }
    }

    /// Releases `count` frames starting at `start`.
    ///
    /// The range must have been returned by [`reserve_frames`](Self::reserve_frames)
    /// (or be part of such a range) and must not have been released since.
    /// Violations are caller bugs: they panic in debug builds and are logged
    /// and ignored in release builds.
    pub fn release_frames(&self, start: PhysicalAddress, count: usize) {
        if !start.is_page_aligned() {
            contract_violation(format_args!("PMM: release of unaligned address {start}"));
            return;
        }

        let first = start.frame_index();
        let Some(end) = first.checked_add(count) else {
            contract_violation(format_args!("PMM: release of {count} frames at {start} overflows"));
            return;
        };

        let mut bitmap = self.allocation.lock();
        if end > bitmap.len() {
            drop(bitmap);
            contract_violation(format_args!(
                "PMM: release of {count} frames at {start} exceeds {} frames",
                self.layout.frame_count
            ));
            return;
        }

        if !bitmap.all_set(first..end) {
            drop(bitmap);
            contract_violation(format_args!(
                "PMM: release of {count} frames at {start} includes free frames"
            ));
            return;
        }

        bitmap.clear_range(first..end);
        drop(bitmap);
        trace!("PMM: released {count} frame(s) at {start}");
    }

    /// Total usable bytes above the low-memory limit.
    #[must_use]
    pub const fn total_system_memory(&self) -> u64 {
        self.layout.physical_memory_size
    }

    #[must_use]
    pub const fn highest_available(&self) -> PhysicalAddress {
        self.layout.highest_available
    }

    /// Note: this address may be reserved by the firmware or some device; use
    /// [`highest_available`](Self::highest_available) for the software bound.
    #[must_use]
    pub const fn highest_present(&self) -> PhysicalAddress {
        self.layout.highest_present
    }

    #[must_use]
    pub const fn layout(&self) -> MemoryLayout {
        self.layout
    }

    /// How many firmware regions of type `kind` were seen at init.
    #[must_use]
    pub const fn region_count(&self, kind: MemoryRegionType) -> u32 {
        self.region_counts[kind.index()]
    }

    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.layout.frame_count
    }

    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.allocation.with_lock(|b| b.count_clear())
    }

    #[must_use]
    pub fn allocated_frames(&self) -> usize {
        self.allocation.with_lock(|b| b.count_set())
    }

    /// Whether the frame containing `address` is allocated. Addresses beyond
    /// the bitmap are reported as allocated, since nobody may hand them out.
    #[must_use]
    pub fn is_allocated(&self, address: PhysicalAddress) -> bool {
        let index = address.frame_index();
        self.allocation
            .with_lock(|b| index >= b.len() || b.is_set(index))
    }
}

/// Frame indices of every frame that overlaps `[start, end)`.
fn frames_touching(start: PhysicalAddress, end: PhysicalAddress) -> Range<usize> {
    if end <= start {
        return 0..0;
    }
    start.align_down().frame_index()..frame_index_rounded_up(end)
}

/// Index of the first frame boundary at or above `address`. Saturates for
/// addresses inside the last frame; the bitmap clips such ranges anyway.
fn frame_index_rounded_up(address: PhysicalAddress) -> usize {
    address
        .checked_align_up()
        .map_or(usize::MAX, PhysicalAddress::frame_index)
}

/// Whether the region's end can be rounded up to a frame boundary.
///
/// A region reaching into the last, partial frame of the address space (or
/// whose `base + length` saturates) has no such boundary.
fn is_frame_addressable(region: &MemoryRegion) -> bool {
    region
        .base
        .as_u64()
        .checked_add(region.length)
        .and_then(|end| PhysicalAddress::new(end).checked_align_up())
        .is_some()
}

#[cold]
#[track_caller]
fn contract_violation(args: core::fmt::Arguments<'_>) {
    error!("{args}");
    if cfg!(debug_assertions) {
        panic!("{args}");
    }
}
