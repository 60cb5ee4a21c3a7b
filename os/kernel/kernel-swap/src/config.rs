use crate::store::BackingStore;
use kernel_info::memory::DEFAULT_SWAP_FILE_SIZE;
use kernel_memory_addresses::PAGE_SIZE;

/// Tuning of the swap subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapConfig {
    /// Number of page-sized slots used in the swap file.
    pub slot_count: usize,
    /// How often a frame reservation retries eviction when the chosen victim
    /// is released by its owner while being paged out.
    pub victim_retries: usize,
}

impl SwapConfig {
    pub const DEFAULT_VICTIM_RETRIES: usize = 4;

    #[must_use]
    pub const fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            victim_retries: Self::DEFAULT_VICTIM_RETRIES,
        }
    }

    /// One slot per whole page of `store`.
    #[must_use]
    pub fn for_store<S: BackingStore + ?Sized>(store: &S) -> Self {
        Self::new(slots_in(store.len()))
    }

    #[must_use]
    pub const fn with_victim_retries(mut self, retries: usize) -> Self {
        self.victim_retries = retries;
        self
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self::new(slots_in(DEFAULT_SWAP_FILE_SIZE))
    }
}

/// Whole pages in `bytes`, saturating at `usize::MAX`.
pub(crate) fn slots_in(bytes: u64) -> usize {
    usize::try_from(bytes / PAGE_SIZE).unwrap_or(usize::MAX)
}
