use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_swap::{PageKey, PageOwner, ProcessId, ResidentPage, ResidentPageList, SwapError};
use kernel_vmem::soft::SoftMmu;
use kernel_vmem::{AddressSpaceRoot, Mmu};
use std::sync::{Arc, Barrier};
use std::thread;

const ROOT_A: AddressSpaceRoot = AddressSpaceRoot::new(0x10_0000);
const ROOT_B: AddressSpaceRoot = AddressSpaceRoot::new(0x20_0000);

fn owner(pid: u32, root: AddressSpaceRoot) -> PageOwner {
    PageOwner::new(ProcessId::new(pid), root)
}

/// Maps page `n` of `owner` to frame `n` and registers it.
fn resident(mmu: &SoftMmu, list: &ResidentPageList, owner: PageOwner, n: u64) -> ResidentPage {
    let page = ResidentPage::new(
        PhysicalAddress::new(n * PAGE_SIZE),
        VirtualAddress::new(0x40_0000 + n * PAGE_SIZE),
        owner,
    );
    mmu.map(owner.root, page.virtual_address, page.physical, PAGE_SIZE)
        .unwrap();
    list.insert(page).unwrap();
    page
}

fn accessed(mmu: &SoftMmu, page: &ResidentPage) -> bool {
    mmu.entry(page.owner.root, page.virtual_address)
        .unwrap()
        .accessed()
}

#[test]
fn empty_list_has_no_victim() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    assert_eq!(list.get_victim(&mmu), Err(SwapError::NoResidentPages));
}

#[test]
fn all_accessed_terminates_within_one_pass_and_clears_every_bit() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let pages: Vec<_> = (0..5)
        .map(|n| resident(&mmu, &list, owner(1, ROOT_A), n))
        .collect();

    for page in &pages {
        mmu.touch(page.owner.root, page.virtual_address).unwrap();
        assert!(accessed(&mmu, page));
    }

    let victim = list.get_victim(&mmu).unwrap();
    assert_eq!(victim, pages[0]);
    assert!(pages.iter().all(|p| !accessed(&mmu, p)));

    // The victim is not removed by selection.
    assert_eq!(list.len(), 5);
    assert_eq!(list.clock_hand(), Some(pages[0]));
}

#[test]
fn accessed_pages_get_a_second_chance() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let a = resident(&mmu, &list, owner(1, ROOT_A), 0);
    let b = resident(&mmu, &list, owner(1, ROOT_A), 1);
    let c = resident(&mmu, &list, owner(1, ROOT_A), 2);

    mmu.touch(ROOT_A, a.virtual_address).unwrap();
    assert_eq!(list.get_victim(&mmu), Ok(b));
    assert!(!accessed(&mmu, &a));

    // The hand stays on `b`; the next scan starts after it.
    assert_eq!(list.get_victim(&mmu), Ok(c));
    assert_eq!(list.get_victim(&mmu), Ok(a));
}

#[test]
fn accessed_bits_are_read_in_the_owners_address_space() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();

    // Same virtual page in two address spaces, backed by different frames.
    let first = resident(&mmu, &list, owner(1, ROOT_A), 0);
    let second = ResidentPage::new(
        PhysicalAddress::new(0x80_0000),
        first.virtual_address,
        owner(2, ROOT_B),
    );
    mmu.map(ROOT_B, second.virtual_address, second.physical, PAGE_SIZE)
        .unwrap();
    list.insert(second).unwrap();

    mmu.touch(ROOT_A, first.virtual_address).unwrap();

    assert_eq!(list.get_victim(&mmu), Ok(second));
}

#[test]
fn unmapped_entries_are_skipped() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let stale = ResidentPage::new(
        PhysicalAddress::new(0x7000),
        VirtualAddress::new(0x7000),
        owner(1, ROOT_A),
    );
    list.insert(stale).unwrap();
    assert_eq!(list.get_victim(&mmu), Err(SwapError::NoVictim { scanned: 2 }));

    let live = resident(&mmu, &list, owner(1, ROOT_A), 3);
    assert_eq!(list.get_victim(&mmu), Ok(live));
}

#[test]
fn remove_and_lookup() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let a = resident(&mmu, &list, owner(1, ROOT_A), 0);
    let b = resident(&mmu, &list, owner(1, ROOT_A), 1);

    // Keys are per page; any address inside it finds the entry.
    let inside = PageKey::new(ProcessId::new(1), a.virtual_address + 0x123);
    assert_eq!(list.get(inside), Some(a));

    assert_eq!(list.remove(a.key()), Ok(a));
    assert_eq!(
        list.remove(a.key()),
        Err(SwapError::NotResident(a.key()))
    );
    assert!(!list.contains(a.key()));
    assert_eq!(list.pages(), vec![b]);

    assert_eq!(
        list.insert(b),
        Err(SwapError::AlreadyResident(b.key()))
    );
}

#[test]
fn removing_the_victim_keeps_the_hand_valid() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let a = resident(&mmu, &list, owner(1, ROOT_A), 0);
    let b = resident(&mmu, &list, owner(1, ROOT_A), 1);
    let c = resident(&mmu, &list, owner(1, ROOT_A), 2);

    mmu.touch(ROOT_A, a.virtual_address).unwrap();
    assert_eq!(list.get_victim(&mmu), Ok(b));
    list.remove(b.key()).unwrap();
    assert_eq!(list.clock_hand(), Some(a));

    assert_eq!(list.get_victim(&mmu), Ok(c));
}

#[test]
fn reset_all_accessed_clears_every_bit() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let pages: Vec<_> = (0..3)
        .map(|n| resident(&mmu, &list, owner(1, ROOT_A), n))
        .collect();
    mmu.touch(ROOT_A, pages[0].virtual_address).unwrap();
    mmu.touch(ROOT_A, pages[2].virtual_address).unwrap();

    assert_eq!(list.reset_all_accessed(&mmu), 2);
    assert!(pages.iter().all(|p| !accessed(&mmu, p)));
    assert_eq!(list.reset_all_accessed(&mmu), 0);
}

#[test]
fn remove_process_only_touches_that_process() {
    let mmu = SoftMmu::new();
    let list = ResidentPageList::new();
    let mine: Vec<_> = (0..3)
        .map(|n| resident(&mmu, &list, owner(7, ROOT_A), n))
        .collect();
    let other = resident(&mmu, &list, owner(8, ROOT_B), 0);

    let removed = list.remove_process(ProcessId::new(7));
    assert_eq!(removed, mine);
    assert_eq!(list.pages(), vec![other]);
}

#[test]
fn concurrent_inserts_are_all_recorded() {
    const THREADS: u32 = 8;
    const PER_THREAD: u64 = 32;

    let list = Arc::new(ResidentPageList::new());
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..PER_THREAD {
                    let page = ResidentPage::new(
                        PhysicalAddress::new((u64::from(t) * PER_THREAD + n) * PAGE_SIZE),
                        VirtualAddress::new(n * PAGE_SIZE),
                        owner(t, ROOT_A),
                    );
                    list.insert(page).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(list.len(), (u64::from(THREADS) * PER_THREAD) as usize);
    for t in 0..THREADS {
        assert_eq!(list.remove_process(ProcessId::new(t)).len(), PER_THREAD as usize);
    }
    assert!(list.is_empty());
}
