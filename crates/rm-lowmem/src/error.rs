use thiserror::Error;

pub type Result<T> = std::result::Result<T, LowMemError>;

/// Errors raised by address conversion and the base-memory allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LowMemError {
    #[error("out of base memory: requested {requested} bytes, {free_kib}KiB free")]
    OutOfBaseMemory { requested: usize, free_kib: u16 },

    #[error("zero-sized base memory allocation")]
    ZeroSize,

    #[error("physical address {addr:#x} is not reachable from real mode")]
    NotRealModeAddressable { addr: u32 },

    #[error("physical address {addr:#x} is not paragraph aligned")]
    UnalignedSegmentBase { addr: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
