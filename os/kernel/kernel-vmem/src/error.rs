use crate::AddressSpaceRoot;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Failures reported by an [`Mmu`](crate::Mmu) implementation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmuError {
    #[error("{va} is not mapped in address space {root}")]
    NotMapped {
        root: AddressSpaceRoot,
        va: VirtualAddress,
    },
    #[error("{va} is already mapped in address space {root}")]
    AlreadyMapped {
        root: AddressSpaceRoot,
        va: VirtualAddress,
    },
    #[error("virtual address {0} is not page aligned")]
    UnalignedVirtual(VirtualAddress),
    #[error("physical address {0} is not page aligned")]
    UnalignedPhysical(PhysicalAddress),
    #[error("address range overflows")]
    RangeOverflow,
    #[error("out of memory for page-table structures")]
    OutOfMemory,
    #[error("page transfer through the MMU failed")]
    TransferFailed,
}
