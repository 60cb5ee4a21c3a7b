//! # Virtual Memory Capability
//!
//! The swap subsystem never walks page tables itself. It consumes the MMU as a
//! capability, described by the [`Mmu`] trait:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`Mmu::query_accessed`] | Read (and optionally clear) the hardware accessed bit of a page. |
//! | [`Mmu::map`] / [`Mmu::unmap`] | Install or tear down 4 KiB translations. |
//! | [`Mmu::read_page`] / [`Mmu::write_page`] | Move one page of data through the kernel's view of an address space. |
//!
//! Every call names the [`AddressSpaceRoot`] it acts on. The root of an
//! x86-64 address space is the physical address of its `PML4` table, i.e. the
//! value loaded into `CR3`; the swap subsystem stores the root of each
//! resident page's owner so it can query accessed bits in the right space
//! instead of whatever space happens to be active.
//!
//! ## Page-table entries
//!
//! [`PageEntryBits`] is the x86-64 4 KiB leaf entry layout, exposed through
//! [`bitfield_struct`]. The software MMU stores its translations in this
//! format so that the accessed/dirty bookkeeping behaves like the hardware's.
//!
//! ## Software MMU
//!
//! With the `soft` feature, [`soft::SoftMmu`] implements [`Mmu`] over
//! simulated physical memory. It is meant for hosted builds and for the swap
//! subsystem's tests; it also offers hooks that play the role of a user
//! process touching its pages.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod address_space;
mod error;
mod mmu;
mod page_entry_bits;

#[cfg(any(test, feature = "soft"))]
pub mod soft;

pub use crate::address_space::AddressSpaceRoot;
pub use crate::error::MmuError;
pub use crate::mmu::{Mmu, PageBuffer};
pub use crate::page_entry_bits::PageEntryBits;
