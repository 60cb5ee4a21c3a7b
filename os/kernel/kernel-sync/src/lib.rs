//! # Kernel synchronization primitives
//!
//! Every structure of the memory manager (frame bitmap, swap bitmap,
//! resident-page list, swap page table) is guarded by its own [`SpinLock`].
//! Locks carry a static name so contention and misuse can be attributed to a
//! structure in log output.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
