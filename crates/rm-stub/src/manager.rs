//! Placement of the librm stub in base memory.
//!
//! There is exactly one installed copy of librm at a time. Moving it uses two slots: the active
//! copy keeps running real-mode code while a new region is staged, the active copy is flushed
//! back to the master image, the master is installed into the staged region, and only then is the
//! new copy committed as active. The old copy is retired by freeing it if (and only if) we
//! allocated it; its bytes are never cleared, because the real-mode exit path or the allocator
//! may still need to call through it.

use rm_lowmem::{AddressTranslator, LinearAddr, LowMemAllocator, PhysAddr};

use crate::config::LibrmConfig;
use crate::error::{LibrmError, Result};
use crate::image::StubImage;
use crate::refcount::RefCount;

/// Everything librm needs from the platform.
pub trait Platform: AddressTranslator + LowMemAllocator {}

impl<T: AddressTranslator + LowMemAllocator + ?Sized> Platform for T {}

/// Owner of the master image, the installed copy and its reference count.
#[derive(Debug, Clone)]
pub struct StubManager {
    pub(crate) master: StubImage,
    pristine: StubImage,
    pub(crate) config: LibrmConfig,
    /// Current copy, in the linear mapping it was last derived from.
    pub(crate) installed: Option<LinearAddr>,
    /// Physical form of `installed`; survives relocation of the linear mapping.
    base: Option<PhysAddr>,
    /// Whether `installed` is backed by base memory we allocated.
    allocated: bool,
    /// Staged target of an in-progress migration.
    pending: Option<LinearAddr>,
    pub(crate) refs: RefCount,
}

impl StubManager {
    pub fn new(image: StubImage, config: LibrmConfig) -> Self {
        Self {
            master: image.clone(),
            pristine: image,
            config,
            installed: None,
            base: None,
            allocated: false,
            pending: None,
            refs: RefCount::default(),
        }
    }

    /// Return to the freshly constructed state, forgetting any installed copy.
    ///
    /// Memory owned by the previous state is not freed.
    pub fn reset(&mut self) {
        *self = Self::new(self.pristine.clone(), self.config.clone());
    }

    pub fn image(&self) -> &StubImage {
        &self.master
    }

    pub fn config(&self) -> &LibrmConfig {
        &self.config
    }

    /// Physical base of the installed copy, if one is known.
    pub fn base(&self) -> Option<PhysAddr> {
        self.base
    }

    pub fn installed(&self) -> Option<LinearAddr> {
        self.installed
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// There is a copy that real-mode calls can go through.
    pub fn has_valid_copy(&self) -> bool {
        self.installed.is_some()
    }

    /// Record the location of a copy we were entered through, e.g. by a real-mode prefix.
    pub fn adopt_entry_base<M: AddressTranslator + ?Sized>(&mut self, mem: &M, base: PhysAddr) {
        tracing::debug!(%base, "librm entered via installed copy");
        self.base = Some(base);
        self.installed = Some(mem.phys_to_linear(base));
    }

    /// Copy the master image to `addr` and make it the installed copy.
    pub fn install<M: AddressTranslator + ?Sized>(&mut self, mem: &mut M, addr: LinearAddr) {
        let base = mem.linear_to_phys(addr);
        mem.write_linear(addr, self.master.as_bytes());
        self.installed = Some(addr);
        self.base = Some(base);
        tracing::debug!(%base, linear = %addr, size = self.master.len(), "librm installed");
    }

    /// Copy the installed copy back to the master image and release its memory if we own it.
    ///
    /// This preserves `rm_ss`/`rm_sp` so a later install picks up where the stack left off. The
    /// installed bytes stay intact and usable until something else reuses the memory.
    pub fn uninstall<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<()> {
        self.ensure_idle()?;
        let Some(installed) = self.installed else {
            return Ok(());
        };

        platform.read_linear(installed, self.master.as_bytes_mut());

        if self.allocated {
            platform.free_base_memory(installed, self.master.len());
            self.allocated = false;
        }
        tracing::debug!(linear = %installed, "librm uninstalled");
        Ok(())
    }

    /// Make sure some copy is installed, falling back to the fixed boot-time location.
    pub fn ensure_bootstrapped<M: AddressTranslator + ?Sized>(&mut self, mem: &mut M) {
        if self.base.is_some() {
            return;
        }

        let base = self.config.fallback_base;
        let stack = self.config.fallback_stack;
        tracing::warn!(%base, "librm not entered via an installed copy, using fallback location");

        let linear = mem.phys_to_linear(base);
        self.install(mem, linear);
        self.write_stack_geometry(mem, linear, stack);
    }

    /// Move librm into base memory that we own.
    ///
    /// Called after the program has relocated; the installed copy is re-derived from its
    /// physical base under the new mapping first. Does nothing further once librm lives in
    /// allocated memory.
    pub fn migrate_to_owned_storage<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<()> {
        self.ensure_idle()?;
        let base = self.base.ok_or(LibrmError::NotInstalled)?;
        self.installed = Some(platform.phys_to_linear(base));

        if self.allocated {
            return Ok(());
        }

        let staged = platform.allocate_base_memory(self.master.len())?;
        self.pending = Some(staged);

        // Flush; nothing is freed because the old copy is not ours.
        self.uninstall(platform)?;
        self.commit(platform);
        Ok(())
    }

    fn commit<M: AddressTranslator + ?Sized>(&mut self, mem: &mut M) {
        let Some(staged) = self.pending.take() else {
            return;
        };
        self.install(mem, staged);
        self.allocated = true;
    }

    fn ensure_idle(&self) -> Result<()> {
        if cfg!(feature = "runtime-checks") && !self.refs.is_zero() {
            return Err(LibrmError::StubBusy {
                holders: self.refs.get(),
            });
        }
        Ok(())
    }
}
