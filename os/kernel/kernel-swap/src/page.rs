//! Identity of swappable pages.

use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::AddressSpaceRoot;

/// Process identifier as handed out by the process manager.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// The kernel's own pages.
    pub const KERNEL: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The process a page belongs to, together with the address space its
/// translations live in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageOwner {
    pub pid: ProcessId,
    pub root: AddressSpaceRoot,
}

impl PageOwner {
    #[inline]
    #[must_use]
    pub const fn new(pid: ProcessId, root: AddressSpaceRoot) -> Self {
        Self { pid, root }
    }
}

/// Key of a page in the resident registry and the swap page table.
///
/// Orders by process first, so all pages of one process form a contiguous
/// range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageKey {
    pub pid: ProcessId,
    pub virtual_address: VirtualAddress,
}

impl PageKey {
    /// Key of the page containing `va`.
    #[inline]
    #[must_use]
    pub const fn new(pid: ProcessId, va: VirtualAddress) -> Self {
        Self {
            pid,
            virtual_address: va.align_down(),
        }
    }

    /// First and last key of process `pid`.
    pub(crate) const fn process_bounds(pid: ProcessId) -> (Self, Self) {
        (
            Self::new(pid, VirtualAddress::new(0)),
            Self::new(pid, VirtualAddress::new(u64::MAX)),
        )
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.virtual_address)
    }
}

/// A page currently backed by a physical frame and eligible for eviction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResidentPage {
    pub physical: PhysicalAddress,
    pub virtual_address: VirtualAddress,
    pub owner: PageOwner,
}

impl ResidentPage {
    /// Both addresses are rounded down to their page.
    #[must_use]
    pub const fn new(physical: PhysicalAddress, va: VirtualAddress, owner: PageOwner) -> Self {
        Self {
            physical: physical.align_down(),
            virtual_address: va.align_down(),
            owner,
        }
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> PageKey {
        PageKey::new(self.owner.pid, self.virtual_address)
    }
}
