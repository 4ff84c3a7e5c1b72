//! Address types for the two address spaces a boot-time program straddles.
//!
//! Protected-mode code sees *linear* addresses; real-mode code and the low-memory hardware see
//! *physical* addresses, which real mode expresses as `segment:offset`. The three are distinct
//! newtypes so that a linear address can never be handed to something expecting a physical one.
//! Conversions between linear and physical go through an
//! [`AddressTranslator`](crate::AddressTranslator); conversions between physical and
//! `segment:offset` are pure and checked here.

use core::fmt;

use crate::error::{LowMemError, Result};

/// Exclusive end of the address window reachable with a normalized `segment:offset` pair.
pub const REAL_MODE_LIMIT: u32 = 0x10_0000;

/// Physical address (what the CPU puts on the bus).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(u32);

/// Linear address in the protected-mode program's view of memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinearAddr(u32);

/// A real-mode `segment:offset` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RealAddr {
    pub segment: u16,
    pub offset: u16,
}

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Advance within physical space. Returns `None` on 32-bit overflow.
    pub fn offset(self, bytes: u32) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// Normalized real-mode form (`addr >> 4 : addr & 0xF`).
    pub fn to_real(self) -> Result<RealAddr> {
        if self.0 >= REAL_MODE_LIMIT {
            return Err(LowMemError::NotRealModeAddressable { addr: self.0 });
        }
        Ok(RealAddr {
            segment: (self.0 >> 4) as u16,
            offset: (self.0 & 0xF) as u16,
        })
    }

    /// The segment whose base is exactly this address.
    ///
    /// Only 16-byte aligned addresses below [`REAL_MODE_LIMIT`] have one.
    pub fn segment_base(self) -> Result<u16> {
        if self.0 >= REAL_MODE_LIMIT {
            return Err(LowMemError::NotRealModeAddressable { addr: self.0 });
        }
        if self.0 & 0xF != 0 {
            return Err(LowMemError::UnalignedSegmentBase { addr: self.0 });
        }
        Ok((self.0 >> 4) as u16)
    }
}

impl LinearAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Advance within linear space. Returns `None` on 32-bit overflow.
    pub fn offset(self, bytes: u32) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl RealAddr {
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// `segment * 16 + offset`. May reach just past 1MiB (the A20 wrap region).
    pub fn to_phys(self) -> PhysAddr {
        PhysAddr((self.segment as u32) * 16 + (self.offset as u32))
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phys:{:#07x}", self.0)
    }
}

impl fmt::Display for LinearAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lin:{:#010x}", self.0)
    }
}

impl fmt::Display for RealAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.segment, self.offset)
    }
}
