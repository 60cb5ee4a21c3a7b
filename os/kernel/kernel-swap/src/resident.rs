//! The resident-page registry and its clock hand.
//!
//! Every swappable page that currently has a frame lives on a circular,
//! doubly linked list. The list is an arena: links are indices into a dense
//! vector, index `0` is the sentinel, and unlinked nodes go on a free list for
//! reuse. A key index finds the node of a page without walking the ring.
//!
//! Victim selection is second-chance: the hand moves forward, and each page it
//! passes has its accessed bit queried and cleared in the owner's address
//! space. The first page found not accessed is the victim. A full lap clears
//! every bit, so the second lap always finds one unless the pages are being
//! touched concurrently; the scan gives up after two laps.
//!
//! Lock order: the registry lock is taken before any lock inside the MMU.

use crate::SwapError;
use crate::page::{PageKey, ProcessId, ResidentPage};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_sync::SpinLock;
use kernel_vmem::Mmu;
use log::{trace, warn};

const SENTINEL: usize = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Link {
    prev: usize,
    next: usize,
}

impl Link {
    const fn detached(node: usize) -> Self {
        Self {
            prev: node,
            next: node,
        }
    }
}

struct Ring {
    links: Vec<Link>,
    /// `None` for the sentinel and for nodes on the free list.
    pages: Vec<Option<ResidentPage>>,
    /// Which insertion put the current page on each node.
    registrations: Vec<u64>,
    next_registration: u64,
    free: Vec<usize>,
    index: BTreeMap<PageKey, usize>,
    /// The node of the last victim, or the sentinel.
    hand: usize,
}

impl Ring {
    fn new() -> Self {
        Self {
            links: alloc::vec![Link::detached(SENTINEL)],
            pages: alloc::vec![None],
            registrations: alloc::vec![0],
            next_registration: 1,
            free: Vec::new(),
            index: BTreeMap::new(),
            hand: SENTINEL,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn insert(&mut self, page: ResidentPage) -> Result<(), SwapError> {
        let key = page.key();
        if self.index.contains_key(&key) {
            return Err(SwapError::AlreadyResident(key));
        }

        let node = if let Some(node) = self.free.pop() {
            self.pages[node] = Some(page);
            node
        } else {
            // Reserve on every vector that may grow so a failure leaves the
            // ring untouched.
            self.links
                .try_reserve(1)
                .and_then(|()| self.pages.try_reserve(1))
                .and_then(|()| self.registrations.try_reserve(1))
                .and_then(|()| self.free.try_reserve(self.links.len()))
                .map_err(|_| SwapError::BookkeepingAllocation)?;
            self.links.push(Link::detached(self.links.len()));
            self.pages.push(Some(page));
            self.registrations.push(0);
            self.pages.len() - 1
        };

        self.registrations[node] = self.next_registration;
        self.next_registration = self.next_registration.wrapping_add(1);

        let tail = self.links[SENTINEL].prev;
        self.links[node] = Link {
            prev: tail,
            next: SENTINEL,
        };
        self.links[tail].next = node;
        self.links[SENTINEL].prev = node;
        self.index.insert(key, node);
        Ok(())
    }

    fn unlink(&mut self, node: usize) -> Option<ResidentPage> {
        debug_assert_ne!(node, SENTINEL);
        let Link { prev, next } = self.links[node];
        self.links[prev].next = next;
        self.links[next].prev = prev;

        // Keep the hand on a live node so the next scan resumes just after
        // the removed one.
        if self.hand == node {
            self.hand = prev;
        }

        self.links[node] = Link::detached(node);
        let page = self.pages[node].take()?;
        self.index.remove(&page.key());
        self.free.push(node);
        Some(page)
    }

    /// The entry after `node`, skipping the sentinel. The ring must not be
    /// empty.
    fn next_entry(&self, node: usize) -> usize {
        match self.links[node].next {
            SENTINEL => self.links[SENTINEL].next,
            next => next,
        }
    }

    fn page(&self, node: usize) -> Option<ResidentPage> {
        self.pages.get(node).copied().flatten()
    }

    fn iter(&self) -> impl Iterator<Item = ResidentPage> + '_ {
        let mut node = self.links[SENTINEL].next;
        core::iter::from_fn(move || {
            if node == SENTINEL {
                return None;
            }
            let page = self.page(node);
            node = self.links[node].next;
            page
        })
    }
}

/// A page picked by the clock, tied to the registration it was picked from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Victim {
    pub page: ResidentPage,
    /// Entries the hand passed to find it.
    pub scanned: usize,
    registration: u64,
}

/// Registry of resident, swappable pages.
pub struct ResidentPageList {
    ring: SpinLock<Ring>,
}

impl Default for ResidentPageList {
    fn default() -> Self {
        Self::new()
    }
}

impl ResidentPageList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: SpinLock::named("resident page list", Ring::new()),
        }
    }

    /// Appends `page` as the newest eviction candidate.
    ///
    /// # Errors
    /// - [`SwapError::AlreadyResident`] if the page is already registered.
    /// - [`SwapError::BookkeepingAllocation`] if the node cannot be allocated.
    pub fn insert(&self, page: ResidentPage) -> Result<(), SwapError> {
        self.ring.with_lock(|ring| ring.insert(page))?;
        trace!(
            "resident: + {} at {} ({})",
            page.virtual_address, page.physical, page.owner.pid
        );
        Ok(())
    }

    /// Unregisters the page `key`.
    ///
    /// # Errors
    /// [`SwapError::NotResident`] if the page is not registered.
    pub fn remove(&self, key: PageKey) -> Result<ResidentPage, SwapError> {
        let page = self.ring.with_lock(|ring| {
            let node = *ring.index.get(&key)?;
            ring.unlink(node)
        });
        let page = page.ok_or(SwapError::NotResident(key))?;
        trace!("resident: - {} at {} ({})", key.virtual_address, page.physical, key.pid);
        Ok(page)
    }

    /// Unregisters `victim`, but only if the page is still registered by the
    /// same insertion that the clock picked it from. A page that was evicted
    /// and brought back in the meantime is left alone, even on the same
    /// frame.
    ///
    /// # Errors
    /// [`SwapError::NotResident`] if the page is gone or was registered again.
    pub(crate) fn remove_victim(&self, victim: &Victim) -> Result<ResidentPage, SwapError> {
        let key = victim.page.key();
        let page = self.ring.with_lock(|ring| {
            let node = *ring.index.get(&key)?;
            let current = ring.page(node) == Some(victim.page)
                && ring.registrations[node] == victim.registration;
            if current { ring.unlink(node) } else { None }
        });
        let page = page.ok_or(SwapError::NotResident(key))?;
        trace!(
            "resident: - {} at {} ({}), evicted",
            key.virtual_address, page.physical, key.pid
        );
        Ok(page)
    }

    /// Picks the next victim by second-chance clock. The victim stays on the
    /// list; the caller removes it once the page is actually evicted.
    ///
    /// # Errors
    /// - [`SwapError::NoResidentPages`] if the list is empty.
    /// - [`SwapError::NoVictim`] if two laps found every page accessed again.
    pub fn get_victim<M: Mmu + ?Sized>(&self, mmu: &M) -> Result<ResidentPage, SwapError> {
        self.select_victim(mmu).map(|victim| victim.page)
    }

    /// [`get_victim`](Self::get_victim), remembering which registration of
    /// the page was picked.
    pub(crate) fn select_victim<M: Mmu + ?Sized>(&self, mmu: &M) -> Result<Victim, SwapError> {
        let mut ring = self.ring.lock();
        let len = ring.len();
        if len == 0 {
            return Err(SwapError::NoResidentPages);
        }

        let limit = 2 * len;
        let mut cursor = ring.hand;
        for scanned in 1..=limit {
            cursor = ring.next_entry(cursor);
            let Some(page) = ring.page(cursor) else {
                continue;
            };

            match mmu.query_accessed(page.owner.root, page.virtual_address, true) {
                Ok(false) => {
                    ring.hand = cursor;
                    let registration = ring.registrations[cursor];
                    drop(ring);
                    trace!("resident: victim {} after {scanned} entries", page.key());
                    return Ok(Victim {
                        page,
                        scanned,
                        registration,
                    });
                }
                Ok(true) => {}
                Err(e) => warn!("resident: skipping {}: {e}", page.key()),
            }
        }

        ring.hand = cursor;
        Err(SwapError::NoVictim { scanned: limit })
    }

    /// Clears the accessed bit of every resident page. Returns how many were
    /// set.
    pub fn reset_all_accessed<M: Mmu + ?Sized>(&self, mmu: &M) -> usize {
        let ring = self.ring.lock();
        ring.iter()
            .filter(|page| {
                match mmu.query_accessed(page.owner.root, page.virtual_address, true) {
                    Ok(accessed) => accessed,
                    Err(e) => {
                        warn!("resident: cannot reset {}: {e}", page.key());
                        false
                    }
                }
            })
            .count()
    }

    #[must_use]
    pub fn get(&self, key: PageKey) -> Option<ResidentPage> {
        self.ring
            .with_lock(|ring| ring.index.get(&key).and_then(|&node| ring.page(node)))
    }

    #[must_use]
    pub fn contains(&self, key: PageKey) -> bool {
        self.ring.with_lock(|ring| ring.index.contains_key(&key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.with_lock(|ring| ring.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The page under the clock hand, if the hand is not on the sentinel.
    #[must_use]
    pub fn clock_hand(&self) -> Option<ResidentPage> {
        self.ring.with_lock(|ring| ring.page(ring.hand))
    }

    /// All resident pages, oldest first.
    #[must_use]
    pub fn pages(&self) -> Vec<ResidentPage> {
        self.ring.with_lock(|ring| ring.iter().collect())
    }

    /// Unregisters every page of `pid`.
    pub fn remove_process(&self, pid: ProcessId) -> Vec<ResidentPage> {
        let (first, last) = PageKey::process_bounds(pid);
        self.ring.with_lock(|ring| {
            let nodes: Vec<usize> = ring.index.range(first..=last).map(|(_, &n)| n).collect();
            nodes.into_iter().filter_map(|node| ring.unlink(node)).collect()
        })
    }
}

impl core::fmt::Debug for ResidentPageList {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResidentPageList")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
