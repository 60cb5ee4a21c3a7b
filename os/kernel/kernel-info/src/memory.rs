//! # Memory Layout

use kernel_memory_addresses::PAGE_SIZE;

/// End of "low memory". Frames below this boundary belong to the BIOS,
/// real-mode IVT and legacy DMA buffers; they are not counted as system memory.
pub const LOW_MEMORY_LIMIT: u64 = 0x0010_0000; // 1 MiB

/// Default size of the swap file when the loader does not specify one.
pub const DEFAULT_SWAP_FILE_SIZE: u64 = 16 * 1024 * 1024;

const _: () = {
    assert!(LOW_MEMORY_LIMIT.is_multiple_of(PAGE_SIZE));
    assert!(DEFAULT_SWAP_FILE_SIZE.is_multiple_of(PAGE_SIZE));
};
