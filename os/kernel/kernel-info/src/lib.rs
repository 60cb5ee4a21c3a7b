//! # Kernel Memory Configuration and Firmware Memory Map
//!
//! This crate holds the boot-time inputs of the memory manager: the layout
//! constants every memory subsystem agrees on, and the firmware memory map
//! format the physical frame allocator consumes once during initialization.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Compile-time constants such as the low-memory boundary below which no
//! frame is counted as usable system memory.
//!
//! ### Memory Map ([`memory_map`])
//! The firmware region list: an ordered list of `{type, base, length}`
//! records as reported by the BIOS `E820` call or translated from the UEFI
//! memory map by the loader.
//!
//! ```text
//! Physical Memory Layout (typical):
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │ never handed out
//! 0x0010_0000 ├─────────────────────────────────┤
//!             │       Kernel Image              │ marked allocated at init
//!             ├─────────────────────────────────┤
//!             │    Usable RAM                   │ managed by the frame bitmap
//!             ├─────────────────────────────────┤
//!             │  Reserved / ACPI / holes        │ marked allocated at init
//!             └─────────────────────────────────┘
//! ```
//!
//! ## ABI
//!
//! [`MemoryRegion`](memory_map::MemoryRegion) is `#[repr(C)]` with fixed-size
//! integers so the loader can hand the list over as a raw buffer.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod memory_map;
