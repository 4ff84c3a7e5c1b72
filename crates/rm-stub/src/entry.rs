//! Entry from real-mode code that calls us with a register-based convention.

use rm_lowmem::ImageRelocator;

use crate::error::{LibrmError, Result};
use crate::hooks::{BootContext, Lifecycle};
use crate::manager::Platform;

/// Register block exchanged with real-mode callers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RealModeRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,

    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub ss: u16,
}

impl RealModeRegs {
    pub fn di(&self) -> u16 {
        self.edi as u16
    }

    pub fn set_di(&mut self, val: u16) {
        self.edi = (self.edi & 0xFFFF_0000) | (val as u32);
    }

    /// Physical address `es:di` points at.
    pub fn es_di(&self) -> u32 {
        (self.es as u32) * 16 + (self.di() as u32)
    }
}

/// Boot through librm and hand the caller its new location.
///
/// After bring-up and relocation, `es` is pointed at the paragraph where the freshly placed stub
/// starts. The caller has already set `di` to the entry point's offset within the stub, so
/// `es:di` is then a far pointer into the new copy.
pub fn initialise_via_librm<P: Platform + ImageRelocator>(
    regs: &mut RealModeRegs,
    lifecycle: &mut Lifecycle<P>,
    ctx: &mut BootContext<P>,
) -> Result<()> {
    lifecycle.boot(ctx)?;

    let base = ctx.librm.base().ok_or(LibrmError::NotInstalled)?;
    regs.es = base.segment_base()?;
    tracing::debug!(es = regs.es, di = regs.di(), "librm entry point published");
    Ok(())
}
