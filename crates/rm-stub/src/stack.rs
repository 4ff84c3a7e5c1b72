//! The real-mode stack: a downward-growing region that protected-mode callers use to pass data
//! to and from real-mode code.
//!
//! The geometry lives in the installed stub's header, so it moves with the stub and is what
//! real-mode code sees as `ss:sp`.

use rm_lowmem::{AddressTranslator, LinearAddr, RealAddr};

use crate::config::StackGeometry;
use crate::error::{LibrmError, Result};
use crate::image::{RM_SP_OFFSET, RM_SS_OFFSET, RM_STACK_TOP_OFFSET};
use crate::manager::StubManager;

/// Identifies a push: the stack offset the data was copied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackToken(u16);

impl StackToken {
    /// Offset of the pushed data within the stack segment.
    pub fn offset(self) -> u16 {
        self.0
    }
}

fn header_field(installed: LinearAddr, field: usize) -> LinearAddr {
    LinearAddr::new(installed.value().wrapping_add(field as u32))
}

impl StubManager {
    pub fn stack_geometry<M: AddressTranslator + ?Sized>(&self, mem: &M) -> Result<StackGeometry> {
        let installed = self.installed.ok_or(LibrmError::NotInstalled)?;
        Ok(StackGeometry {
            segment: mem.read_u16_linear(header_field(installed, RM_SS_OFFSET)),
            offset: mem.read_u16_linear(header_field(installed, RM_SP_OFFSET)),
            top: mem.read_u16_linear(header_field(installed, RM_STACK_TOP_OFFSET)),
        })
    }

    pub(crate) fn write_stack_geometry<M: AddressTranslator + ?Sized>(
        &self,
        mem: &mut M,
        installed: LinearAddr,
        stack: StackGeometry,
    ) {
        mem.write_u16_linear(header_field(installed, RM_SS_OFFSET), stack.segment);
        mem.write_u16_linear(header_field(installed, RM_SP_OFFSET), stack.offset);
        mem.write_u16_linear(header_field(installed, RM_STACK_TOP_OFFSET), stack.top);
    }

    /// Reserve `data.len()` bytes on the real-mode stack and copy `data` there.
    ///
    /// Fails with [`LibrmError::StackExhausted`] unless `data.len()` is strictly less than the
    /// current offset.
    pub fn push_to_rm_stack<M: AddressTranslator + ?Sized>(
        &mut self,
        mem: &mut M,
        data: &[u8],
    ) -> Result<StackToken> {
        let installed = self.installed.ok_or(LibrmError::NotInstalled)?;
        let stack = self.stack_geometry(mem)?;
        let size = data.len();

        if cfg!(feature = "runtime-checks") && size >= usize::from(stack.offset) {
            tracing::error!(size, offset = stack.offset, "librm: out of space in RM stack");
            return Err(LibrmError::StackExhausted {
                requested: size,
                available: stack.offset,
            });
        }

        let offset = stack.offset.wrapping_sub(size as u16);
        mem.write_u16_linear(header_field(installed, RM_SP_OFFSET), offset);
        mem.copy_to_real(RealAddr::new(stack.segment, offset), data);
        tracing::trace!(size, ss = stack.segment, sp = offset, "rm stack push");
        Ok(StackToken(offset))
    }

    /// Release `size` bytes from the real-mode stack, copying them into `out` first if given.
    ///
    /// Releases must mirror pushes in reverse order. `out`, when present, must hold at least
    /// `size` bytes.
    pub fn pop_from_rm_stack<M: AddressTranslator + ?Sized>(
        &mut self,
        mem: &mut M,
        out: Option<&mut [u8]>,
        size: usize,
    ) -> Result<()> {
        let installed = self.installed.ok_or(LibrmError::NotInstalled)?;
        let stack = self.stack_geometry(mem)?;

        if cfg!(feature = "runtime-checks") && usize::from(stack.offset) + size > usize::from(stack.top)
        {
            return Err(LibrmError::StackUnderflow {
                requested: size,
                above: stack.used(),
            });
        }

        if let Some(out) = out {
            mem.copy_from_real(&mut out[..size], RealAddr::new(stack.segment, stack.offset));
        }

        let offset = stack.offset.wrapping_add(size as u16);
        mem.write_u16_linear(header_field(installed, RM_SP_OFFSET), offset);
        tracing::trace!(size, ss = stack.segment, sp = offset, "rm stack pop");
        Ok(())
    }
}
