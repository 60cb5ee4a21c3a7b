//! # Firmware Memory Map

use kernel_memory_addresses::PhysicalAddress;

/// Classification of a firmware memory region.
///
/// The discriminants follow the BIOS `E820` type codes so a raw map can be
/// converted with [`MemoryRegionType::from_raw`].
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MemoryRegionType {
    /// Free RAM usable by the operating system.
    Usable = 1,
    /// Reserved by the firmware or a device; never touched.
    Reserved = 2,
    /// ACPI tables; reclaimable once they have been parsed.
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage; must be preserved across sleep states.
    AcpiNvs = 4,
    /// RAM reported as defective.
    Unusable = 5,
    /// Disabled by the firmware.
    Disabled = 6,
    /// Persistent (non-volatile) memory.
    Persistent = 7,
}

impl MemoryRegionType {
    /// Number of distinct region types, for per-type tables.
    pub const COUNT: usize = 7;

    /// All region types in discriminant order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Usable,
        Self::Reserved,
        Self::AcpiReclaimable,
        Self::AcpiNvs,
        Self::Unusable,
        Self::Disabled,
        Self::Persistent,
    ];

    /// Converts a raw `E820` type code. Unknown codes are treated as
    /// [`Reserved`](Self::Reserved), which is what the ACPI specification
    /// asks operating systems to do.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Usable,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::Unusable,
            6 => Self::Disabled,
            7 => Self::Persistent,
            _ => Self::Reserved,
        }
    }

    /// Zero-based position of this type in [`ALL`](Self::ALL).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Whether frames in this region may be handed out by the allocator.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable)
    }
}

/// A single `{type, base, length}` record of the firmware memory map.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    /// First byte of the region.
    pub base: PhysicalAddress,
    /// Length of the region in bytes.
    pub length: u64,
    /// What the firmware says the region is.
    pub kind: MemoryRegionType,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(kind: MemoryRegionType, base: u64, length: u64) -> Self {
        Self {
            base: PhysicalAddress::new(base),
            length,
            kind,
        }
    }

    /// Exclusive end address, saturating at the top of the address space.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64().saturating_add(self.length))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of bytes of this region at or above `floor`.
    #[must_use]
    pub const fn bytes_above(&self, floor: u64) -> u64 {
        let start = if self.base.as_u64() > floor {
            self.base.as_u64()
        } else {
            floor
        };
        self.end().as_u64().saturating_sub(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_are_reserved() {
        assert_eq!(MemoryRegionType::from_raw(1), MemoryRegionType::Usable);
        assert_eq!(MemoryRegionType::from_raw(0), MemoryRegionType::Reserved);
        assert_eq!(MemoryRegionType::from_raw(42), MemoryRegionType::Reserved);
    }

    #[test]
    fn index_matches_table_position() {
        for (i, kind) in MemoryRegionType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn bytes_above_clips_low_memory() {
        let r = MemoryRegion::new(MemoryRegionType::Usable, 0, 0x20_0000);
        assert_eq!(r.end().as_u64(), 0x20_0000);
        assert_eq!(r.bytes_above(0x10_0000), 0x10_0000);

        let low = MemoryRegion::new(MemoryRegionType::Usable, 0, 0x9_F000);
        assert_eq!(low.bytes_above(0x10_0000), 0);

        let high = MemoryRegion::new(MemoryRegionType::Usable, 0x40_0000, 0x1000);
        assert_eq!(high.bytes_above(0x10_0000), 0x1000);
    }
}
