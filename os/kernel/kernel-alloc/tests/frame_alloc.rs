use kernel_alloc::{FrameAllocError, PhysicalMemory, PmmConfig, PmmInitError};
use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

fn pa(v: u64) -> PhysicalAddress {
    PhysicalAddress::new(v)
}

/// A small PC-like map: low RAM, the BIOS hole, 7 MiB of RAM with a reserved
/// hole punched into it, and an MMIO window far above.
fn pc_memory_map() -> Vec<MemoryRegion> {
    vec![
        MemoryRegion::new(MemoryRegionType::Usable, 0, 0x9_F000),
        MemoryRegion::new(MemoryRegionType::Reserved, 0x9_F000, 0x6_1000),
        MemoryRegion::new(MemoryRegionType::Usable, 0x10_0000, 0x70_0000),
        MemoryRegion::new(MemoryRegionType::Reserved, 0x70_0000, 0x1_0000),
        MemoryRegion::new(MemoryRegionType::AcpiNvs, 0x1000_0000, 0x1000),
    ]
}

#[test]
fn first_fit_on_four_frames() {
    let pmm = PhysicalMemory::with_free_frames(4);

    assert_eq!(pmm.reserve_frames(2, None), Ok(pa(0)));
    assert_eq!(pmm.reserve_frames(2, None), Ok(pa(2 * PAGE_SIZE)));
    assert_eq!(
        pmm.reserve_frames(1, None),
        Err(FrameAllocError::OutOfFrames {
            requested: 1,
            min_address: pa(0)
        })
    );
}

#[test]
fn zero_frames_is_rejected() {
    let pmm = PhysicalMemory::with_free_frames(4);
    assert_eq!(pmm.reserve_frames(0, None), Err(FrameAllocError::ZeroFrames));
    assert_eq!(pmm.free_frames(), 4);
}

#[test]
fn min_address_is_rounded_up() {
    let pmm = PhysicalMemory::with_free_frames(8);

    // 0x2001 is inside frame 2; the first acceptable start is frame 3.
    let a = pmm.reserve_frames(1, Some(pa(0x2001))).unwrap();
    assert_eq!(a.frame_index(), 3);

    let b = pmm.reserve_frames(1, Some(pa(0x3000))).unwrap();
    assert_eq!(b.frame_index(), 4);

    // Frames below the minimum are still free.
    assert!(!pmm.is_allocated(pa(0)));
    assert_eq!(pmm.reserve_frames(1, None), Ok(pa(0)));
}

#[test]
fn contiguous_run_skips_holes() {
    let pmm = PhysicalMemory::with_free_frames(8);
    let single = pmm.reserve_frames(1, Some(pa(2 * PAGE_SIZE))).unwrap();
    assert_eq!(single.frame_index(), 2);

    // Frames 0-1 are too short for a run of three.
    let run = pmm.reserve_frames(3, None).unwrap();
    assert_eq!(run.frame_index(), 3);
    assert_eq!(pmm.free_frames(), 4);
}

#[test]
fn release_makes_frames_available_again() {
    let pmm = PhysicalMemory::with_free_frames(4);
    let a = pmm.reserve_frames(4, None).unwrap();
    assert_eq!(pmm.allocated_frames(), 4);
    assert_eq!(pmm.free_frames(), 0);

    pmm.release_frames(a + PAGE_SIZE, 2);
    assert_eq!(pmm.free_frames(), 2);
    assert!(pmm.is_allocated(pa(0)));
    assert!(!pmm.is_allocated(pa(PAGE_SIZE)));
    assert!(!pmm.is_allocated(pa(2 * PAGE_SIZE + 0x123)));
    assert!(pmm.is_allocated(pa(3 * PAGE_SIZE)));

    assert_eq!(pmm.reserve_frames(2, None), Ok(pa(PAGE_SIZE)));
}

#[test]
fn addresses_beyond_the_bitmap_count_as_allocated() {
    let pmm = PhysicalMemory::with_free_frames(4);
    assert!(pmm.is_allocated(pa(4 * PAGE_SIZE)));
    assert!(pmm.is_allocated(pa(u64::MAX)));
}

#[test]
fn init_from_memory_map() {
    let kernel = pa(0x20_0000)..pa(0x28_0000);
    let pmm = PhysicalMemory::init(&pc_memory_map(), kernel, &PmmConfig::default()).unwrap();

    let layout = pmm.layout();
    assert_eq!(layout.highest_available, pa(0x80_0000));
    assert_eq!(layout.highest_present, pa(0x1000_1000));
    assert!(layout.highest_present >= layout.highest_available);
    assert_eq!(layout.frame_count, 0x1_0001);
    assert_eq!(pmm.total_system_memory(), 0x70_0000);

    assert_eq!(pmm.region_count(MemoryRegionType::Usable), 2);
    assert_eq!(pmm.region_count(MemoryRegionType::Reserved), 2);
    assert_eq!(pmm.region_count(MemoryRegionType::AcpiNvs), 1);
    assert_eq!(pmm.region_count(MemoryRegionType::Unusable), 0);

    // Low memory is held back by default.
    assert!(pmm.is_allocated(pa(0)));
    assert!(pmm.is_allocated(pa(0x9_E000)));

    // The reserved hole wins over the usable region it overlaps.
    assert!(pmm.is_allocated(pa(0x70_0000)));
    assert!(pmm.is_allocated(pa(0x70_F000)));
    assert!(!pmm.is_allocated(pa(0x71_0000)));

    // Kernel image.
    assert!(pmm.is_allocated(pa(0x20_0000)));
    assert!(pmm.is_allocated(pa(0x27_F000)));
    assert!(!pmm.is_allocated(pa(0x28_0000)));

    // Gap between RAM and the ACPI window.
    assert!(pmm.is_allocated(pa(0x80_0000)));

    // 0x700 usable frames above 1 MiB, minus 0x10 reserved, minus 0x80 kernel.
    assert_eq!(pmm.free_frames(), 0x700 - 0x10 - 0x80);
    assert_eq!(pmm.free_frames() + pmm.allocated_frames(), pmm.frame_count());

    let first = pmm.reserve_frames(1, None).unwrap();
    assert_eq!(first, pa(0x10_0000));
}

#[test]
fn low_memory_can_be_handed_out_when_configured() {
    let config = PmmConfig::default().with_reserve_low_memory(false);
    let pmm = PhysicalMemory::init(&pc_memory_map(), pa(0)..pa(0), &config).unwrap();

    assert!(!pmm.is_allocated(pa(0)));
    assert_eq!(pmm.free_frames(), 0x9F + 0x700 - 0x10);
    assert_eq!(pmm.reserve_frames(1, None), Ok(pa(0)));
}

#[test]
fn partial_frames_of_usable_regions_stay_allocated() {
    let regions = [
        MemoryRegion::new(MemoryRegionType::Usable, 0x10_0800, 0x2000),
        MemoryRegion::new(MemoryRegionType::Reserved, 0x10_2800, 0x100),
    ];
    let pmm = PhysicalMemory::init(&regions, pa(0)..pa(0), &PmmConfig::default()).unwrap();

    // Only frame 0x101 lies entirely inside the usable region.
    assert_eq!(pmm.free_frames(), 1);
    assert_eq!(pmm.reserve_frames(1, None), Ok(pa(0x10_1000)));
}

#[test]
fn init_rejects_degenerate_maps() {
    let config = PmmConfig::default();
    assert_eq!(
        PhysicalMemory::init(&[], pa(0)..pa(0), &config).unwrap_err(),
        PmmInitError::EmptyMemoryMap
    );

    let reserved_only = [MemoryRegion::new(MemoryRegionType::Reserved, 0, 0x10_0000)];
    assert_eq!(
        PhysicalMemory::init(&reserved_only, pa(0)..pa(0), &config).unwrap_err(),
        PmmInitError::NoUsableMemory
    );
}

#[test]
fn min_address_in_the_last_frame_is_out_of_frames() {
    let pmm = PhysicalMemory::with_free_frames(4);
    let min_address = pa(u64::MAX - 10);

    assert_eq!(
        pmm.reserve_frames(1, Some(min_address)),
        Err(FrameAllocError::OutOfFrames {
            requested: 1,
            min_address
        })
    );
    assert_eq!(pmm.free_frames(), 4);
}

#[test]
fn regions_ending_in_the_last_frame_are_ignored() {
    let regions = [
        MemoryRegion::new(MemoryRegionType::Usable, 0x10_0000, 0x10_0000),
        // Ends exactly at 2^64, so `base + length` saturates.
        MemoryRegion::new(MemoryRegionType::Reserved, u64::MAX - 0x7FF, 0x800),
        // Ends inside the last frame.
        MemoryRegion::new(MemoryRegionType::Usable, 0xFFFF_FFFF_FFFF_E000, 0x1800),
    ];
    let pmm = PhysicalMemory::init(&regions, pa(0)..pa(0), &PmmConfig::default()).unwrap();

    assert_eq!(pmm.highest_present(), pa(0x20_0000));
    assert_eq!(pmm.highest_available(), pa(0x20_0000));
    assert_eq!(pmm.frame_count(), 0x200);
    assert_eq!(pmm.free_frames(), 0x100);
    assert_eq!(pmm.region_count(MemoryRegionType::Usable), 1);
    assert_eq!(pmm.region_count(MemoryRegionType::Reserved), 0);
    assert!(pmm.is_allocated(pa(u64::MAX - 0x7FF)));
}

#[test]
fn concurrent_reservations_get_distinct_frames() {
    const FRAMES: usize = 8;
    const THREADS: usize = FRAMES + 1;

    let pmm = Arc::new(PhysicalMemory::with_free_frames(FRAMES));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pmm = Arc::clone(&pmm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pmm.reserve_frames(1, None)
            })
        })
        .collect();

    let mut frames = BTreeSet::new();
    let mut failures = Vec::new();
    for h in handles {
        match h.join().unwrap() {
            Ok(frame) => assert!(frames.insert(frame), "{frame} handed out twice"),
            Err(err) => failures.push(err),
        }
    }

    assert_eq!(frames.len(), FRAMES);
    assert_eq!(
        failures,
        vec![FrameAllocError::OutOfFrames {
            requested: 1,
            min_address: pa(0)
        }]
    );
    assert_eq!(pmm.free_frames(), 0);
}
