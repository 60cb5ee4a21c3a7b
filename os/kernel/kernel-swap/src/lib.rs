//! # Paging and Swap
//!
//! Decides which swappable pages keep their physical frames and moves the
//! others to a swap file and back.
//!
//! ## Components
//!
//! ```text
//!                      ┌──────────────────────────┐
//!   fault handler ───► │      MemoryManager       │ ◄─── frame requests
//!                      └───┬───────────┬──────────┘
//!                          │           │
//!               ┌──────────▼──┐   ┌────▼─────────────────────────────┐
//!               │ PhysicalMem │   │            SwapEngine            │
//!               │ (frames)    │   │  page_out / page_in / consistency│
//!               └─────────────┘   └──┬──────────┬──────────┬─────────┘
//!                                    │          │          │
//!                        ┌───────────▼──┐ ┌─────▼──────┐ ┌─▼───────────────┐
//!                        │ ResidentPage │ │ SwapPage   │ │ SwapSlot        │
//!                        │ List (clock) │ │ Table      │ │ Allocator       │
//!                        └──────────────┘ └────────────┘ └─────────────────┘
//! ```
//!
//! * [`ResidentPageList`](resident::ResidentPageList): every resident,
//!   swappable page, scanned by a second-chance clock hand.
//! * [`SwapPageTable`](table::SwapPageTable): pages whose only copy lives in
//!   the swap file, keyed by process and virtual address.
//! * [`SwapSlotAllocator`](slots::SwapSlotAllocator): a bitmap over the
//!   page-sized slots of the swap file.
//! * [`SwapEngine`](engine::SwapEngine): the ordered page-out protocol, page-in
//!   and the recovery-time consistency check.
//! * [`MemoryManager`](manager::MemoryManager): the context object owning all
//!   of the above together with the frame allocator, the MMU capability and
//!   the backing store.
//!
//! ## Locking
//!
//! Each structure has its own named spin lock and every operation holds at
//! most one of them at a time, except victim selection, which calls into the
//! MMU while holding the resident list lock. No lock is held across backing
//! store I/O.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::PhysicalMemory;
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_swap::{MemoryBackingStore, MemoryManager, PageOwner, ProcessId, SwapConfig};
//! use kernel_vmem::{AddressSpaceRoot, soft::SoftMmu};
//!
//! let store = MemoryBackingStore::new(8 * 4096);
//! let config = SwapConfig::for_store(&store);
//! let mm = MemoryManager::new(PhysicalMemory::with_free_frames(1), SoftMmu::new(), store, config)?;
//!
//! let owner = PageOwner::new(ProcessId::new(1), AddressSpaceRoot::new(0x1000));
//! let a = VirtualAddress::new(0x40_0000);
//! let b = VirtualAddress::new(0x40_1000);
//!
//! mm.map_swappable_page(owner, a)?;
//! // The only frame is taken; mapping `b` evicts `a`.
//! mm.map_swappable_page(owner, b)?;
//! assert!(mm.lookup_swap_entry(owner.pid, a).is_ok());
//! # Ok::<(), kernel_swap::SwapError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod page;
pub mod resident;
pub mod slots;
pub mod stats;
pub mod store;
pub mod table;

pub use config::SwapConfig;
pub use engine::{ConsistencyReport, SwapEngine};
pub use error::{ErrorKind, SwapError};
pub use manager::{DiscardedPages, MemoryManager, MemoryUsage};
pub use page::{PageKey, PageOwner, ProcessId, ResidentPage};
pub use resident::ResidentPageList;
pub use slots::{SwapSlot, SwapSlotAllocator};
pub use stats::{SwapStats, SwapStatsSnapshot};
pub use store::{BackingStore, IoError, MemoryBackingStore};
pub use table::{SwapEntry, SwapPageTable};
