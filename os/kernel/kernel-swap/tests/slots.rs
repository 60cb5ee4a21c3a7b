use kernel_swap::{ErrorKind, SwapError, SwapSlot, SwapSlotAllocator};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn slots_are_handed_out_first_fit() {
    let slots = SwapSlotAllocator::new(4);
    assert_eq!(slots.allocate_slot(), Ok(SwapSlot::new(0)));
    assert_eq!(slots.allocate_slot(), Ok(SwapSlot::new(1)));
    assert_eq!(slots.allocate_slot(), Ok(SwapSlot::new(2)));

    assert!(slots.release(SwapSlot::new(1)));
    assert_eq!(slots.allocate_slot(), Ok(SwapSlot::new(1)));
    assert_eq!(slots.allocate_slot(), Ok(SwapSlot::new(3)));
    assert_eq!(slots.free_count(), 0);
}

#[test]
fn exhaustion_is_an_allocation_failure() {
    let slots = SwapSlotAllocator::new(2);
    slots.allocate_slot().unwrap();
    slots.reserve().unwrap();

    let err = slots.allocate_slot().unwrap_err();
    assert_eq!(err, SwapError::NoFreeSlot);
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert_eq!(slots.reserve(), Err(SwapError::NoFreeSlot));
}

#[test]
fn zero_capacity_has_no_slots() {
    let slots = SwapSlotAllocator::new(0);
    assert_eq!(slots.capacity(), 0);
    assert_eq!(slots.allocate_slot(), Err(SwapError::NoFreeSlot));
    assert!(!slots.is_occupied(SwapSlot::new(0)));
}

#[test]
fn double_release_is_a_no_op() {
    let slots = SwapSlotAllocator::new(4);
    let slot = slots.allocate_slot().unwrap();
    assert!(slots.release(slot));
    assert!(!slots.release(slot));
    assert_eq!(slots.free_count(), 4);

    // Out of range, too.
    assert!(!slots.release(SwapSlot::new(100)));
}

#[test]
fn pending_slots_are_claimed_but_not_occupied() {
    let slots = SwapSlotAllocator::new(4);
    let pending = slots.reserve().unwrap();
    assert_eq!(pending, SwapSlot::new(0));
    assert!(!slots.is_occupied(pending));
    assert_eq!(slots.pending_count(), 1);
    assert_eq!(slots.free_count(), 3);

    // Another page-out skips the pending slot.
    assert_eq!(slots.reserve(), Ok(SwapSlot::new(1)));

    // A pending slot cannot be released, only aborted or committed.
    assert!(!slots.release(pending));
    assert_eq!(slots.pending_count(), 2);

    slots.commit(pending);
    assert!(slots.is_occupied(pending));
    assert_eq!(slots.pending_count(), 1);

    slots.abort(SwapSlot::new(1));
    assert_eq!(slots.pending_count(), 0);
    assert_eq!(slots.occupied_slots(), vec![pending]);
}

#[test]
fn abort_of_an_occupied_slot_keeps_it() {
    let slots = SwapSlotAllocator::new(2);
    let slot = slots.allocate_slot().unwrap();
    slots.abort(slot);
    assert!(slots.is_occupied(slot));
}

#[test]
fn offsets_are_page_multiples() {
    assert_eq!(SwapSlot::new(0).offset(), 0);
    assert_eq!(SwapSlot::new(3).offset(), 0x3000);
    assert_eq!(SwapSlot::from_offset(0x3000), Some(SwapSlot::new(3)));
    assert_eq!(SwapSlot::from_offset(0x3001), None);
    assert_eq!(SwapSlot::from_offset(u64::MAX & !0xfff), None);
    assert_eq!(SwapSlot::new(7).index(), 7);
}

#[test]
fn concurrent_allocations_are_distinct() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 64;

    let slots = Arc::new(SwapSlotAllocator::new(THREADS * PER_THREAD));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let slots = Arc::clone(&slots);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|_| slots.allocate_slot().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = BTreeSet::new();
    for h in handles {
        for slot in h.join().unwrap() {
            assert!(seen.insert(slot), "{slot} handed out twice");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert_eq!(slots.allocate_slot(), Err(SwapError::NoFreeSlot));
}
