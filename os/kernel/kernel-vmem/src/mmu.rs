use crate::{AddressSpaceRoot, MmuError};
use kernel_memory_addresses::{PAGE_SIZE_USIZE, PhysicalAddress, VirtualAddress};

/// One page worth of data, as moved between memory and the backing store.
pub type PageBuffer = [u8; PAGE_SIZE_USIZE];

/// The page-table capability the memory manager is built on.
///
/// Implementations must be safe to call from any thread; each call is
/// expected to be atomic with respect to the translations it touches.
/// Lengths are in bytes and are rounded up to whole pages.
pub trait Mmu: Sync {
    /// Returns the accessed bit of the page containing `va` in `root`,
    /// clearing it afterwards if `clear` is set.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page has no present translation.
    fn query_accessed(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        clear: bool,
    ) -> Result<bool, MmuError>;

    /// Maps `[va, va + len)` to `[pa, pa + len)` in `root`.
    ///
    /// # Errors
    /// Alignment errors, [`MmuError::AlreadyMapped`] if any page of the range
    /// is present, or [`MmuError::OutOfMemory`] if intermediate tables
    /// cannot be allocated. On error no page of the range is mapped.
    fn map(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
    ) -> Result<(), MmuError>;

    /// Removes the translations of `[va, va + len)` in `root` and flushes them
    /// from the TLB. The frames themselves are left untouched.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if any page of the range is not present; in
    /// that case nothing is unmapped.
    fn unmap(&self, root: AddressSpaceRoot, va: VirtualAddress, len: u64) -> Result<(), MmuError>;

    /// Copies the page at `va` in `root` into `buf`.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page is not present.
    fn read_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &mut PageBuffer,
    ) -> Result<(), MmuError>;

    /// Overwrites the page at `va` in `root` with `buf`.
    ///
    /// # Errors
    /// [`MmuError::NotMapped`] if the page is not present.
    fn write_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &PageBuffer,
    ) -> Result<(), MmuError>;
}

impl<M: Mmu + ?Sized> Mmu for &M {
    fn query_accessed(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        clear: bool,
    ) -> Result<bool, MmuError> {
        (**self).query_accessed(root, va, clear)
    }

    fn map(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
    ) -> Result<(), MmuError> {
        (**self).map(root, va, pa, len)
    }

    fn unmap(&self, root: AddressSpaceRoot, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        (**self).unmap(root, va, len)
    }

    fn read_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &mut PageBuffer,
    ) -> Result<(), MmuError> {
        (**self).read_page(root, va, buf)
    }

    fn write_page(
        &self,
        root: AddressSpaceRoot,
        va: VirtualAddress,
        buf: &PageBuffer,
    ) -> Result<(), MmuError> {
        (**self).write_page(root, va, buf)
    }
}
