#![forbid(unsafe_code)]

//! Low-memory plumbing for boot-time code that calls into real mode.
//!
//! This crate owns the address-space vocabulary ([`PhysAddr`], [`LinearAddr`], [`RealAddr`]),
//! the collaborator interfaces the real-mode stub manager is written against
//! ([`AddressTranslator`], [`LowMemAllocator`], [`ImageRelocator`]), and [`PcLowMemory`], a dense
//! in-memory PC platform implementing all of them.

mod addr;
mod error;
mod pc;
mod translate;

pub use addr::{LinearAddr, PhysAddr, RealAddr, REAL_MODE_LIMIT};
pub use error::{LowMemError, Result};
pub use pc::{
    PcLowMemory, PcLowMemoryConfig, BASE_MEMORY_GRANULE, BDA_FREE_BASE_MEMORY_ADDR,
    DEFAULT_BASE_MEMORY_KIB,
};
pub use translate::{AddressTranslator, ImageRelocator, LowMemAllocator};
