#![forbid(unsafe_code)]

//! librm: keeps the real-mode call stub installed somewhere real-mode code can reach it.
//!
//! Protected-mode boot code calls BIOS services through a small stub living in base memory. This
//! crate owns that stub ([`StubManager`]): it installs it at a fixed fallback address early in
//! boot, moves it into allocated base memory once the program has relocated itself, carves
//! argument space out of its private real-mode stack, and counts the real-mode calls in flight so
//! nothing moves the stub underneath them.
//!
//! Boot wiring lives in [`hooks`]; [`entry`] is the register-convention entry used when we were
//! loaded by a real-mode prefix.

mod config;
mod error;
mod image;
mod manager;
mod refcount;
mod stack;

pub mod entry;
pub mod hooks;

pub use config::{
    LibrmConfig, StackGeometry, FALLBACK_BASE, FALLBACK_STACK_SEGMENT, FALLBACK_STACK_SIZE,
};
pub use error::{lockup, LibrmError, Result};
pub use image::{StubImage, RM_SP_OFFSET, RM_SS_OFFSET, RM_STACK_TOP_OFFSET, STUB_HEADER_LEN};
pub use manager::{Platform, StubManager};
pub use refcount::{RefCount, StubLock};
pub use stack::StackToken;
