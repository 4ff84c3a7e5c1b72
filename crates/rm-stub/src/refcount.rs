use core::ops::{Deref, DerefMut};

use crate::error::{lockup, LibrmError, Result};
use crate::manager::StubManager;

/// Count of real-mode call sequences that need librm to stay where it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefCount(u32);

impl RefCount {
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn acquire(&mut self) {
        self.0 = self.0.wrapping_add(1);
        tracing::trace!(count = self.0, "librm locked");
    }

    pub fn release(&mut self) -> Result<()> {
        if cfg!(feature = "runtime-checks") && self.0 == 0 {
            return Err(LibrmError::RefCountUnderflow);
        }
        self.0 = self.0.wrapping_sub(1);
        tracing::trace!(count = self.0, "librm unlocked");
        Ok(())
    }
}

impl StubManager {
    /// Take a reference on the installed stub before entering real mode.
    pub fn lock_librm(&mut self) {
        self.refs.acquire();
    }

    /// Drop a reference taken with [`lock_librm`](Self::lock_librm).
    pub fn unlock_librm(&mut self) -> Result<()> {
        self.refs.release()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    /// Bracket a real-mode call sequence. The reference is dropped with the guard.
    pub fn lock(&mut self) -> StubLock<'_> {
        self.lock_librm();
        StubLock { manager: self }
    }
}

/// Scoped reference on librm; see [`StubManager::lock`].
///
/// Derefs to the manager so the real-mode stack can be used while the lock is held.
#[must_use = "dropping the lock immediately releases librm"]
pub struct StubLock<'a> {
    manager: &'a mut StubManager,
}

impl Deref for StubLock<'_> {
    type Target = StubManager;

    fn deref(&self) -> &StubManager {
        self.manager
    }
}

impl DerefMut for StubLock<'_> {
    fn deref_mut(&mut self) -> &mut StubManager {
        self.manager
    }
}

impl Drop for StubLock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.manager.unlock_librm() {
            lockup(&err);
        }
    }
}
