use rm_lowmem::LowMemError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LibrmError>;

/// Failures of the real-mode stub manager.
///
/// [`StackExhausted`](LibrmError::StackExhausted), [`RefCountUnderflow`](LibrmError::RefCountUnderflow)
/// and [`StubBusy`](LibrmError::StubBusy) are invariant violations with no recovery path: the
/// caller is expected to hand them to [`lockup`](crate::lockup). Builds without the
/// `runtime-checks` feature skip the checks that raise them, but the contract is the same.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibrmError {
    #[error("out of space in real-mode stack: requested {requested} bytes, {available} available")]
    StackExhausted { requested: usize, available: u16 },

    #[error("real-mode stack underflow: popped {requested} bytes with {above} on the stack")]
    StackUnderflow { requested: usize, above: u16 },

    #[error("librm reference count gone negative")]
    RefCountUnderflow,

    #[error("librm is in use by {holders} real-mode call(s)")]
    StubBusy { holders: u32 },

    #[error("librm is not installed")]
    NotInstalled,

    #[error("stub image is {len} bytes, shorter than its {header}-byte header")]
    ImageTooSmall { len: usize, header: usize },

    #[error("hook `{0}` is already registered")]
    DuplicateHook(&'static str),

    #[error("cannot {op} while lifecycle is {phase}")]
    HookPhase {
        op: &'static str,
        phase: &'static str,
    },

    #[error(transparent)]
    LowMem(#[from] LowMemError),
}

impl LibrmError {
    /// Whether this error means the stub or its stack can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LibrmError::StackExhausted { .. }
                | LibrmError::RefCountUnderflow
                | LibrmError::StubBusy { .. }
        )
    }
}

/// Halt on an unrecoverable librm failure.
///
/// On bare metal this is where the CPU would be parked; hosted builds log and panic.
#[cold]
pub fn lockup(err: &LibrmError) -> ! {
    tracing::error!(error = %err, "librm: lockup");
    panic!("librm: {err}");
}
