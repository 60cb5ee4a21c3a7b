use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress};

/// An x86-64 **4 KiB leaf PTE** in its raw bitfield form.
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty |
/// | 7         | `PAT`             | Page attribute table index bit |
/// | 8         | `G`               | Global |
/// | 9–11      | OS avail low      | Reserved for OS use |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–58     | OS avail high     | Reserved for OS use |
/// | 59–62     | `PKU` / OS use    | Protection key or OS use |
/// | 63        | `NX`              | Execute disable |
///
/// ### Accessed and dirty
/// The CPU sets `A` on the first access through the entry and `D` on the
/// first write; it never clears either. Second-chance eviction clears `A`
/// itself and watches whether it comes back.
///
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let mut e = PageEntryBits::leaf(PhysicalAddress::new(0x5000), true);
/// assert!(e.present());
/// assert!(!e.accessed());
/// e.set_accessed(true);
/// assert_eq!(e.physical_address().as_u64(), 0x5000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// **Present** (bit 0).
    pub present: bool,

    /// **Writable** (bit 1).
    pub writable: bool,

    /// **User/Supervisor** (bit 2).
    pub user: bool,

    /// **Page Write-Through** (bit 3).
    pub write_through: bool,

    /// **Page Cache Disable** (bit 4).
    pub cache_disable: bool,

    /// **Accessed** (bit 5): set by the CPU on any access.
    pub accessed: bool,

    /// **Dirty** (bit 6): set by the CPU on a write.
    pub dirty: bool,

    /// **PAT** (bit 7) for 4 KiB entries.
    pub pat: bool,

    /// **Global** (bit 8).
    pub global: bool,

    /// **OS-available low** (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,

    /// **Frame number** (bits 12..51).
    #[bits(40)]
    frame: u64,

    /// **OS-available high** (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,

    /// **Protection Key** (bits 59..62).
    #[bits(4)]
    pub protection_key: u8,

    /// **No-Execute** (bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// A present user leaf mapping `frame`.
    #[inline]
    #[must_use]
    pub const fn leaf(frame: PhysicalAddress, writable: bool) -> Self {
        let mut e = Self::new();
        e.set_present(true);
        e.set_writable(writable);
        e.set_user(true);
        e.set_physical_address(frame);
        e
    }

    /// Set the frame base address (must be 4 KiB-aligned).
    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        debug_assert!(phys.is_page_aligned());
        self.set_frame(phys.as_u64() >> PAGE_SHIFT);
    }

    /// Get the frame base address (4 KiB-aligned).
    #[inline]
    #[must_use]
    pub const fn physical_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << PAGE_SHIFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_layout_matches_hardware_bits() {
        let e = PageEntryBits::leaf(PhysicalAddress::new(0x1234_5000), true);
        // P | RW | US
        assert_eq!(e.into_bits() & 0xFFF, 0b111);
        assert_eq!(e.into_bits() & !0xFFF, 0x1234_5000);
    }

    #[test]
    fn accessed_and_dirty_are_bits_5_and_6() {
        let mut e = PageEntryBits::new();
        e.set_accessed(true);
        assert_eq!(e.into_bits(), 1 << 5);
        e.set_dirty(true);
        assert_eq!(e.into_bits(), (1 << 5) | (1 << 6));
    }

    #[test]
    fn frame_field_is_40_bits_wide() {
        let top = PhysicalAddress::new(((1u64 << 40) - 1) << PAGE_SHIFT);
        let mut e = PageEntryBits::new();
        e.set_physical_address(top);
        e.set_no_execute(true);
        assert_eq!(e.physical_address(), top);
        assert!(e.no_execute());
        assert!(!e.present());
    }
}
