use rm_lowmem::PhysAddr;

/// Where librm is installed when the program was not entered through an existing copy.
///
/// Anything that enters before the post-relocation hook runs must agree on this address.
pub const FALLBACK_BASE: PhysAddr = PhysAddr::new(0x7c00);
/// Real-mode stack segment used together with [`FALLBACK_BASE`].
pub const FALLBACK_STACK_SEGMENT: u16 = 0x07c0;
/// Size of the fallback real-mode stack; also its initial offset.
pub const FALLBACK_STACK_SIZE: u16 = 0x1000;

/// Real-mode stack bookkeeping as stored in the stub header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackGeometry {
    /// `ss` used by real-mode code.
    pub segment: u16,
    /// Current `sp`. Decreases as data is pushed.
    pub offset: u16,
    /// Offset of an empty stack.
    pub top: u16,
}

impl StackGeometry {
    /// An empty stack of `size` bytes in `segment`.
    pub const fn empty(segment: u16, size: u16) -> Self {
        Self {
            segment,
            offset: size,
            top: size,
        }
    }

    /// Bytes currently pushed.
    pub fn used(&self) -> u16 {
        self.top.wrapping_sub(self.offset)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibrmConfig {
    /// Physical install address when no prior location is known.
    pub fallback_base: PhysAddr,
    /// Stack set up alongside a fallback install.
    pub fallback_stack: StackGeometry,
}

impl Default for LibrmConfig {
    fn default() -> Self {
        Self {
            fallback_base: FALLBACK_BASE,
            fallback_stack: StackGeometry::empty(FALLBACK_STACK_SEGMENT, FALLBACK_STACK_SIZE),
        }
    }
}
