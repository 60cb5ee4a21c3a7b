//! # Physical Memory Management
//!
//! This crate owns the physical frame allocator of the kernel: a bitmap with
//! one bit per 4 KiB frame, built once at boot from the firmware memory map
//! and shared by reference afterwards.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Firmware memory map (E820-style)         │
//! │    • {type, base, length} records                   │
//! │    • Usable / reserved / ACPI / defective           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ PhysicalMemory::init
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Memory Manager                │
//! │    • Frame bitmap (1 = allocated, 0 = free)         │
//! │    • First-fit contiguous reservation               │
//! │    • Immutable layout snapshot                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Bitmap ([`bitmap`])
//!
//! A plain bit array with first-fit run search. It is shared with the swap
//! slot allocator, which uses the same representation for slots.
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! * **Initialization**: usable regions are freed, everything else stays
//!   taken; reserved classifications override overlapping usable ones.
//! * **Reservation**: `reserve_frames(count, min)` returns the first run of
//!   `count` free frames starting at or above `min`.
//! * **Release**: releasing frames that are not allocated is a contract
//!   violation and panics in debug builds.
//! * **Statistics**: total usable memory, highest available and present
//!   addresses, per-type region counts.
//!
//! ## Concurrency
//!
//! The bitmap is guarded by a named [`SpinLock`](kernel_sync::SpinLock); the
//! layout scalars are fixed after init and read without locking.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::frame_alloc::PhysicalMemory;
//!
//! let pmm = PhysicalMemory::with_free_frames(4);
//! let a = pmm.reserve_frames(2, None).unwrap();
//! let b = pmm.reserve_frames(2, None).unwrap();
//! assert_eq!(a.frame_index(), 0);
//! assert_eq!(b.frame_index(), 2);
//! assert!(pmm.reserve_frames(1, None).is_err());
//!
//! pmm.release_frames(a, 2);
//! assert_eq!(pmm.free_frames(), 2);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod config;
pub mod error;
pub mod frame_alloc;

pub use config::PmmConfig;
pub use error::{FrameAllocError, PmmInitError};
pub use frame_alloc::{MemoryLayout, PhysicalMemory};
