//! Boot lifecycle: ordered initialisers with paired teardown, and post-relocation callbacks.
//!
//! Hooks are plain function pointers run against a [`BootContext`], which owns the platform and
//! the single [`StubManager`]. A boot goes through
//! `initialise` → (program relocation) → `post_relocate` → `shutdown`.

use core::fmt;

use rm_lowmem::ImageRelocator;

use crate::error::{LibrmError, Result};
use crate::manager::{Platform, StubManager};

/// Run order of an initialiser; lower runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InitOrder(pub u8);

impl InitOrder {
    /// librm comes up before anything that might print or call the BIOS.
    pub const LIBRM: InitOrder = InitOrder(1);
    pub const CONSOLE: InitOrder = InitOrder(2);
    pub const NORMAL: InitOrder = InitOrder(8);
}

/// Run order of a post-relocation callback; lower runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostRelocOrder(pub u8);

impl PostRelocOrder {
    pub const LIBRM: PostRelocOrder = PostRelocOrder(1);
    pub const NORMAL: PostRelocOrder = PostRelocOrder(8);
}

/// State shared by every hook for one boot.
#[derive(Debug)]
pub struct BootContext<P> {
    pub platform: P,
    pub librm: StubManager,
}

impl<P> BootContext<P> {
    pub fn new(platform: P, librm: StubManager) -> Self {
        Self { platform, librm }
    }
}

pub type HookFn<P> = fn(&mut BootContext<P>) -> Result<()>;

pub struct InitFn<P> {
    pub name: &'static str,
    pub order: InitOrder,
    pub init: Option<HookFn<P>>,
    pub exit: Option<HookFn<P>>,
}

pub struct PostRelocFn<P> {
    pub name: &'static str,
    pub order: PostRelocOrder,
    pub run: HookFn<P>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Registering,
    Initialised,
    Relocated,
    ShutDown,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Registering => "registering",
            Phase::Initialised => "initialised",
            Phase::Relocated => "relocated",
            Phase::ShutDown => "shut down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Lifecycle<P> {
    init_fns: Vec<InitFn<P>>,
    post_reloc_fns: Vec<PostRelocFn<P>>,
    /// Number of leading `init_fns` that completed.
    initialised: usize,
    phase: Phase,
}

impl<P> Default for Lifecycle<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Lifecycle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field(
                "init_fns",
                &self.init_fns.iter().map(|hook| hook.name).collect::<Vec<_>>(),
            )
            .field(
                "post_reloc_fns",
                &self.post_reloc_fns.iter().map(|hook| hook.name).collect::<Vec<_>>(),
            )
            .field("initialised", &self.initialised)
            .field("phase", &self.phase)
            .finish()
    }
}

impl<P> Lifecycle<P> {
    pub fn new() -> Self {
        Self {
            init_fns: Vec::new(),
            post_reloc_fns: Vec::new(),
            initialised: 0,
            phase: Phase::Registering,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn phase_error(&self, op: &'static str) -> LibrmError {
        LibrmError::HookPhase {
            op,
            phase: self.phase.name(),
        }
    }

    pub fn register_init(&mut self, init_fn: InitFn<P>) -> Result<()> {
        if self.phase != Phase::Registering {
            return Err(self.phase_error("register an initialiser"));
        }
        if self.init_fns.iter().any(|f| f.name == init_fn.name) {
            return Err(LibrmError::DuplicateHook(init_fn.name));
        }
        let at = self
            .init_fns
            .partition_point(|f| f.order <= init_fn.order);
        self.init_fns.insert(at, init_fn);
        Ok(())
    }

    pub fn register_post_reloc(&mut self, post_reloc_fn: PostRelocFn<P>) -> Result<()> {
        if self.phase != Phase::Registering {
            return Err(self.phase_error("register a post-relocation hook"));
        }
        if self
            .post_reloc_fns
            .iter()
            .any(|f| f.name == post_reloc_fn.name)
        {
            return Err(LibrmError::DuplicateHook(post_reloc_fn.name));
        }
        let at = self
            .post_reloc_fns
            .partition_point(|f| f.order <= post_reloc_fn.order);
        self.post_reloc_fns.insert(at, post_reloc_fn);
        Ok(())
    }

    /// Run every initialiser in order. Stops at the first failure; initialisers that completed
    /// are still torn down by [`shutdown`](Self::shutdown).
    ///
    /// Calling again after a successful run does nothing.
    pub fn initialise(&mut self, ctx: &mut BootContext<P>) -> Result<()> {
        match self.phase {
            Phase::Registering => {}
            Phase::Initialised | Phase::Relocated => return Ok(()),
            Phase::ShutDown => return Err(self.phase_error("initialise")),
        }

        while let Some(init_fn) = self.init_fns.get(self.initialised) {
            tracing::debug!(hook = init_fn.name, "running initialiser");
            if let Some(init) = init_fn.init {
                init(ctx)?;
            }
            self.initialised += 1;
        }
        self.phase = Phase::Initialised;
        Ok(())
    }

    /// Run every post-relocation callback, once per relocation event.
    pub fn post_relocate(&mut self, ctx: &mut BootContext<P>) -> Result<()> {
        if !matches!(self.phase, Phase::Initialised | Phase::Relocated) {
            return Err(self.phase_error("run post-relocation hooks"));
        }

        for post_reloc_fn in &self.post_reloc_fns {
            tracing::debug!(hook = post_reloc_fn.name, "running post-relocation hook");
            (post_reloc_fn.run)(ctx)?;
        }
        self.phase = Phase::Relocated;
        Ok(())
    }

    /// Tear down completed initialisers in reverse order.
    ///
    /// Every exit hook runs even if an earlier one fails; the first failure is returned.
    pub fn shutdown(&mut self, ctx: &mut BootContext<P>) -> Result<()> {
        if self.phase == Phase::ShutDown {
            return Ok(());
        }

        let mut first_err = None;
        for init_fn in self.init_fns[..self.initialised].iter().rev() {
            let Some(exit) = init_fn.exit else {
                continue;
            };
            tracing::debug!(hook = init_fn.name, "running exit hook");
            if let Err(err) = exit(ctx) {
                tracing::warn!(hook = init_fn.name, error = %err, "exit hook failed");
                first_err.get_or_insert(err);
            }
        }
        self.initialised = 0;
        self.phase = Phase::ShutDown;
        first_err.map_or(Ok(()), Err)
    }
}

impl<P: ImageRelocator> Lifecycle<P> {
    /// Full bring-up: initialise, let the program relocate itself, then re-anchor.
    pub fn boot(&mut self, ctx: &mut BootContext<P>) -> Result<()> {
        self.initialise(ctx)?;
        let moved = ctx.platform.relocate();
        tracing::debug!(moved, "program relocation finished");
        self.post_relocate(ctx)
    }
}

fn librm_init<P: Platform>(ctx: &mut BootContext<P>) -> Result<()> {
    ctx.librm.ensure_bootstrapped(&mut ctx.platform);
    Ok(())
}

fn librm_exit<P: Platform>(ctx: &mut BootContext<P>) -> Result<()> {
    ctx.librm.uninstall(&mut ctx.platform)
}

fn librm_post_reloc<P: Platform>(ctx: &mut BootContext<P>) -> Result<()> {
    ctx.librm.migrate_to_owned_storage(&mut ctx.platform)
}

/// Register librm's bring-up initialiser (with teardown) and its post-relocation hook.
pub fn register_librm<P: Platform>(lifecycle: &mut Lifecycle<P>) -> Result<()> {
    lifecycle.register_init(InitFn {
        name: "librm",
        order: InitOrder::LIBRM,
        init: Some(librm_init::<P>),
        exit: Some(librm_exit::<P>),
    })?;
    lifecycle.register_post_reloc(PostRelocFn {
        name: "librm",
        order: PostRelocOrder::LIBRM,
        run: librm_post_reloc::<P>,
    })
}
