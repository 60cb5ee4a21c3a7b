//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses used by the frame
//! allocator, the swap subsystem and the MMU capability.
//!
//! ## Overview
//!
//! The memory manager juggles three kinds of numbers that are all `u64` at the
//! machine level: physical addresses, virtual addresses and frame indices.
//! Mixing them up is the classic source of paging bugs, so this crate gives
//! each its own type:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address of either kind. |
//! | [`PhysicalAddress`] | A location in host RAM (or MMIO). |
//! | [`VirtualAddress`] | A location in some address space. |
//!
//! Frame indices are plain `usize` values, because they index bitmaps; the
//! conversion is [`PhysicalAddress::frame_index`] /
//! [`PhysicalAddress::from_frame_index`].
//!
//! ## Page Granularity
//!
//! The subsystem manages memory in [`PAGE_SIZE`] (4 KiB) units only. Huge
//! pages are never swapped and never handed out by the frame allocator.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0020_1234);
//! assert_eq!(pa.frame_index(), 0x201);
//! assert_eq!(pa.align_down().as_u64(), 0x0020_1000);
//! assert_eq!(pa.page_offset(), 0x234);
//!
//! let back = PhysicalAddress::from_frame_index(0x201);
//! assert!(back.is_page_aligned());
//! assert_eq!(back.as_u64(), 0x0020_1000);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`
//!   and `Hash`, so they can be used as map keys.
//! - All arithmetic helpers are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod memory_address;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Size of a page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// [`PAGE_SIZE`] as `usize`, for buffer lengths.
#[allow(clippy::cast_possible_truncation)]
pub const PAGE_SIZE_USIZE: usize = PAGE_SIZE as usize;

const _: () = {
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
    assert!(PAGE_SIZE.is_power_of_two());
};

/// Number of pages needed to cover `bytes`, rounding up.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}
