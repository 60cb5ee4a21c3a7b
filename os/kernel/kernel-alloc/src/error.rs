use kernel_memory_addresses::PhysicalAddress;

/// Failure to reserve physical frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("cannot reserve zero frames")]
    ZeroFrames,
    #[error("no run of {requested} free frames at or above {min_address}")]
    OutOfFrames {
        requested: usize,
        min_address: PhysicalAddress,
    },
}

/// Failure to build the frame bitmap from the firmware memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PmmInitError {
    #[error("the firmware memory map is empty")]
    EmptyMemoryMap,
    #[error("the firmware memory map has no usable region")]
    NoUsableMemory,
    #[error("no memory for a frame bitmap of {frames} frames")]
    BitmapAllocation { frames: usize },
}
