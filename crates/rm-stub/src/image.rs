//! The librm image: a small real-mode blob whose header carries the state that has to survive
//! being copied between locations.
//!
//! Header layout (little endian):
//!
//! | offset | field          |
//! |--------|----------------|
//! | `0x00` | `rm_ss`        |
//! | `0x02` | `rm_sp`        |
//! | `0x04` | `rm_stack_top` |
//! | `0x06` | reserved       |
//!
//! Code follows at [`STUB_HEADER_LEN`].

use crate::config::StackGeometry;
use crate::error::{LibrmError, Result};

pub const RM_SS_OFFSET: usize = 0x00;
pub const RM_SP_OFFSET: usize = 0x02;
pub const RM_STACK_TOP_OFFSET: usize = 0x04;
pub const STUB_HEADER_LEN: usize = 0x08;

// retf
const BUILTIN_CODE: &[u8] = &[0xCB];

/// The master copy of librm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubImage {
    bytes: Vec<u8>,
}

impl StubImage {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < STUB_HEADER_LEN {
            return Err(LibrmError::ImageTooSmall {
                len: bytes.len(),
                header: STUB_HEADER_LEN,
            });
        }
        Ok(Self { bytes })
    }

    /// Built-in image: empty header followed by a far-return entry point, padded to a paragraph.
    pub fn builtin() -> Self {
        let mut bytes = vec![0u8; STUB_HEADER_LEN];
        bytes.extend_from_slice(BUILTIN_CODE);
        bytes.resize(bytes.len().next_multiple_of(16), 0);
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Stack bookkeeping held in the master copy.
    pub fn stack_geometry(&self) -> StackGeometry {
        StackGeometry {
            segment: self.header_u16(RM_SS_OFFSET),
            offset: self.header_u16(RM_SP_OFFSET),
            top: self.header_u16(RM_STACK_TOP_OFFSET),
        }
    }

    fn header_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }
}
