use crate::page::PageKey;
use crate::slots::SwapSlot;
use crate::store::IoError;
use kernel_alloc::FrameAllocError;
use kernel_vmem::MmuError;

/// Coarse classification of [`SwapError`]s, for callers that only need to
/// decide between retrying, evicting, or failing the faulting process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// No frame, slot, victim or bookkeeping memory is available.
    AllocationFailure,
    /// The key is not present in the structure it was looked up in.
    ElementNotFound,
    /// The key is already present.
    AlreadyExists,
    /// The backing store failed or transferred fewer bytes than requested.
    IoFailure,
    /// The MMU rejected a mapping operation.
    Mmu,
    /// The subsystem was set up with inconsistent parameters.
    Configuration,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error(transparent)]
    Frames(#[from] FrameAllocError),
    #[error("no free swap slot")]
    NoFreeSlot,
    #[error("no memory for swap bookkeeping")]
    BookkeepingAllocation,
    #[error("no resident pages to evict")]
    NoResidentPages,
    #[error("no evictable page found after scanning {scanned} entries")]
    NoVictim { scanned: usize },
    #[error("victim {0} was released while it was being paged out")]
    VictimLost(PageKey),
    #[error("page {0} is already registered as resident")]
    AlreadyResident(PageKey),
    #[error("page {0} is not registered as resident")]
    NotResident(PageKey),
    #[error("page {0} already has a swap entry")]
    AlreadySwapped(PageKey),
    #[error("page {0} has no swap entry")]
    NotSwapped(PageKey),
    #[error("page {0} is neither resident nor swapped")]
    UnknownPage(PageKey),
    #[error("swap slot {0} is not occupied")]
    SlotNotOccupied(SwapSlot),
    #[error("swap offset {0:#x} does not name a slot")]
    InvalidOffset(u64),
    #[error("swap store I/O failed: {0}")]
    Io(#[from] IoError),
    #[error("MMU operation failed: {0}")]
    Mmu(#[from] MmuError),
    #[error("swap store holds {available} slots but {requested} were configured")]
    StoreTooSmall { requested: usize, available: usize },
}

impl SwapError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Frames(_)
            | Self::NoFreeSlot
            | Self::BookkeepingAllocation
            | Self::NoResidentPages
            | Self::NoVictim { .. } => ErrorKind::AllocationFailure,
            Self::VictimLost(_)
            | Self::NotResident(_)
            | Self::NotSwapped(_)
            | Self::UnknownPage(_)
            | Self::SlotNotOccupied(_)
            | Self::InvalidOffset(_) => ErrorKind::ElementNotFound,
            Self::AlreadyResident(_) | Self::AlreadySwapped(_) => ErrorKind::AlreadyExists,
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Mmu(_) => ErrorKind::Mmu,
            Self::StoreTooSmall { .. } => ErrorKind::Configuration,
        }
    }

    /// Whether retrying the same operation may succeed without any other
    /// change to the system.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::VictimLost(_))
    }
}
