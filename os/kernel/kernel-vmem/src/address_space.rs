use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Identity of an address space: the physical address of its top-level page
/// table.
///
/// Two processes never share a root, so the root doubles as a cheap key when
/// the MMU needs to know which translations a call refers to.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AddressSpaceRoot(u64);

impl AddressSpaceRoot {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Root whose top-level table lives at `table`.
    #[inline]
    #[must_use]
    pub const fn from_table(table: PhysicalAddress) -> Self {
        Self(table.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical address of the top-level table.
    #[inline]
    #[must_use]
    pub const fn table(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }
}

impl fmt::Debug for AddressSpaceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS(0x{:016X})", self.0)
    }
}

impl fmt::Display for AddressSpaceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
