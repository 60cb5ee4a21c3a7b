//! Boot-time tuning of the physical memory manager.

use kernel_info::memory::LOW_MEMORY_LIMIT;

/// Configuration consumed by [`PhysicalMemory::init`](crate::frame_alloc::PhysicalMemory::init).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PmmConfig {
    /// Memory below this address is not counted in the total system memory.
    pub low_memory_limit: u64,
    /// Keep every frame below [`low_memory_limit`](Self::low_memory_limit)
    /// allocated, even if the firmware reports it usable.
    pub reserve_low_memory: bool,
}

impl PmmConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            low_memory_limit: LOW_MEMORY_LIMIT,
            reserve_low_memory: true,
        }
    }

    #[must_use]
    pub const fn with_low_memory_limit(mut self, limit: u64) -> Self {
        self.low_memory_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_reserve_low_memory(mut self, reserve: bool) -> Self {
        self.reserve_low_memory = reserve;
        self
    }
}

impl Default for PmmConfig {
    fn default() -> Self {
        Self::new()
    }
}
