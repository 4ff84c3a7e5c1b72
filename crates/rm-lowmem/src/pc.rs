//! Reference PC low-memory platform.
//!
//! [`PcLowMemory`] models the first megabyte (by default) of a PC as dense RAM, a movable
//! linear mapping for the protected-mode program, and the classic BIOS base-memory allocation
//! scheme:
//!
//! - The BIOS data area word at physical `0x413` holds the amount of free conventional memory in
//!   KiB ("free base memory size").
//! - Allocating lowers that word and hands out the KiB-granular block just above the new top.
//! - Freeing a block at the current top raises the word again, absorbing any previously freed
//!   blocks that have become adjacent. Blocks freed out of order are remembered until then.
//!
//! Reads outside RAM float high (`0xFF`) and writes outside RAM are dropped, matching open-bus
//! behaviour of unbacked physical addresses.

use std::collections::BTreeMap;

use crate::addr::{LinearAddr, PhysAddr};
use crate::error::{LowMemError, Result};
use crate::translate::{AddressTranslator, ImageRelocator, LowMemAllocator};

/// BIOS data area: free base memory size in KiB (`0040:0013`).
pub const BDA_FREE_BASE_MEMORY_ADDR: u32 = 0x413;
/// Conventional memory size reported by a typical BIOS.
pub const DEFAULT_BASE_MEMORY_KIB: u16 = 640;
/// Allocation granule of the BDA scheme.
pub const BASE_MEMORY_GRANULE: usize = 1024;

#[derive(Clone, Debug)]
pub struct PcLowMemoryConfig {
    /// Size of the dense physical RAM backing store.
    pub ram_bytes: usize,
    /// Initial value of the BDA free base memory word.
    pub base_memory_kib: u16,
    /// Initial linear mapping: `linear = phys - virt_offset`.
    pub virt_offset: u32,
}

impl Default for PcLowMemoryConfig {
    fn default() -> Self {
        Self {
            ram_bytes: 1024 * 1024,
            base_memory_kib: DEFAULT_BASE_MEMORY_KIB,
            virt_offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PcLowMemory {
    ram: Vec<u8>,
    virt_offset: u32,
    scheduled_relocation: Option<u32>,
    /// Live allocations, keyed by starting KiB.
    live: BTreeMap<u16, u16>,
    /// Freed blocks below the current top, keyed by starting KiB.
    holes: BTreeMap<u16, u16>,
    allocations: usize,
    frees: usize,
}

impl PcLowMemory {
    pub fn new(config: PcLowMemoryConfig) -> Result<Self> {
        if config.ram_bytes < usize::from(config.base_memory_kib) * BASE_MEMORY_GRANULE {
            return Err(LowMemError::InvalidConfig(
                "base memory does not fit in physical RAM",
            ));
        }
        if config.ram_bytes <= BDA_FREE_BASE_MEMORY_ADDR as usize + 2 {
            return Err(LowMemError::InvalidConfig(
                "physical RAM does not cover the BIOS data area",
            ));
        }

        let mut mem = Self {
            ram: vec![0; config.ram_bytes],
            virt_offset: config.virt_offset,
            scheduled_relocation: None,
            live: BTreeMap::new(),
            holes: BTreeMap::new(),
            allocations: 0,
            frees: 0,
        };
        mem.set_free_base_memory_kib(config.base_memory_kib);
        Ok(mem)
    }

    pub fn virt_offset(&self) -> u32 {
        self.virt_offset
    }

    /// Change the linear mapping immediately.
    pub fn relocate_to(&mut self, virt_offset: u32) {
        tracing::debug!(
            from = self.virt_offset,
            to = virt_offset,
            "linear mapping moved"
        );
        self.virt_offset = virt_offset;
    }

    /// Arrange for the next [`ImageRelocator::relocate`] call to move the mapping.
    pub fn schedule_relocation(&mut self, virt_offset: u32) {
        self.scheduled_relocation = Some(virt_offset);
    }

    pub fn free_base_memory_kib(&self) -> u16 {
        self.read_phys_u16(BDA_FREE_BASE_MEMORY_ADDR)
    }

    fn set_free_base_memory_kib(&mut self, kib: u16) {
        self.write_phys(PhysAddr::new(BDA_FREE_BASE_MEMORY_ADDR), &kib.to_le_bytes());
    }

    /// Number of successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of accepted frees so far.
    pub fn frees(&self) -> usize {
        self.frees
    }

    /// Allocations not yet freed.
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    pub fn read_phys(&self, addr: PhysAddr, dst: &mut [u8]) {
        let start = addr.value() as usize;
        for (i, out) in dst.iter_mut().enumerate() {
            *out = start
                .checked_add(i)
                .and_then(|idx| self.ram.get(idx))
                .copied()
                .unwrap_or(0xFF);
        }
    }

    pub fn write_phys(&mut self, addr: PhysAddr, src: &[u8]) {
        let start = addr.value() as usize;
        for (i, &b) in src.iter().enumerate() {
            if let Some(slot) = start.checked_add(i).and_then(|idx| self.ram.get_mut(idx)) {
                *slot = b;
            }
        }
    }

    pub fn read_phys_u16(&self, addr: u32) -> u16 {
        let mut buf = [0u8; 2];
        self.read_phys(PhysAddr::new(addr), &mut buf);
        u16::from_le_bytes(buf)
    }

    fn absorb_holes(&mut self) {
        loop {
            let top = self.free_base_memory_kib();
            match self.holes.remove(&top) {
                Some(len) => self.set_free_base_memory_kib(top + len),
                None => break,
            }
        }
    }
}

impl AddressTranslator for PcLowMemory {
    fn phys_to_linear(&self, addr: PhysAddr) -> LinearAddr {
        LinearAddr::new(addr.value().wrapping_sub(self.virt_offset))
    }

    fn linear_to_phys(&self, addr: LinearAddr) -> PhysAddr {
        PhysAddr::new(addr.value().wrapping_add(self.virt_offset))
    }

    fn read_linear(&self, addr: LinearAddr, dst: &mut [u8]) {
        self.read_phys(self.linear_to_phys(addr), dst);
    }

    fn write_linear(&mut self, addr: LinearAddr, src: &[u8]) {
        let phys = self.linear_to_phys(addr);
        self.write_phys(phys, src);
    }
}

impl LowMemAllocator for PcLowMemory {
    fn allocate_base_memory(&mut self, size: usize) -> Result<LinearAddr> {
        if size == 0 {
            return Err(LowMemError::ZeroSize);
        }

        let free_kib = self.free_base_memory_kib();
        let kib = size.div_ceil(BASE_MEMORY_GRANULE);
        let kib = match u16::try_from(kib) {
            Ok(kib) if kib <= free_kib => kib,
            _ => {
                return Err(LowMemError::OutOfBaseMemory {
                    requested: size,
                    free_kib,
                })
            }
        };

        let start_kib = free_kib - kib;
        self.set_free_base_memory_kib(start_kib);
        self.live.insert(start_kib, kib);
        self.allocations += 1;

        let phys = PhysAddr::new(u32::from(start_kib) * BASE_MEMORY_GRANULE as u32);
        tracing::debug!(%phys, size, free_kib = start_kib, "allocated base memory");
        Ok(self.phys_to_linear(phys))
    }

    fn free_base_memory(&mut self, addr: LinearAddr, size: usize) {
        let phys = self.linear_to_phys(addr).value();
        let start_kib = phys / BASE_MEMORY_GRANULE as u32;
        let kib = size.div_ceil(BASE_MEMORY_GRANULE);

        let matches = phys % BASE_MEMORY_GRANULE as u32 == 0
            && u16::try_from(start_kib)
                .ok()
                .and_then(|start| self.live.get(&start).map(|len| (start, *len)))
                .is_some_and(|(_, len)| usize::from(len) == kib);
        if !matches {
            tracing::warn!(phys, size, "ignoring free of base memory that was not allocated");
            return;
        }

        let start_kib = start_kib as u16;
        let kib = kib as u16;
        self.live.remove(&start_kib);
        self.frees += 1;

        if start_kib == self.free_base_memory_kib() {
            self.set_free_base_memory_kib(start_kib + kib);
            self.absorb_holes();
        } else {
            self.holes.insert(start_kib, kib);
        }
        tracing::debug!(
            phys,
            size,
            free_kib = self.free_base_memory_kib(),
            "freed base memory"
        );
    }
}

impl ImageRelocator for PcLowMemory {
    fn relocate(&mut self) -> bool {
        match self.scheduled_relocation.take() {
            Some(offset) if offset != self.virt_offset => {
                self.relocate_to(offset);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> PcLowMemory {
        PcLowMemory::new(PcLowMemoryConfig::default()).unwrap()
    }

    #[test]
    fn bda_word_is_seeded_from_config() {
        let mem = mem();
        assert_eq!(mem.free_base_memory_kib(), 640);
        assert_eq!(mem.read_phys_u16(BDA_FREE_BASE_MEMORY_ADDR), 640);
    }

    #[test]
    fn linear_mapping_follows_virt_offset() {
        let mut mem = mem();
        mem.relocate_to(0x1000);
        let lin = mem.phys_to_linear(PhysAddr::new(0x7c00));
        assert_eq!(lin, LinearAddr::new(0x6c00));
        assert_eq!(mem.linear_to_phys(lin), PhysAddr::new(0x7c00));

        mem.write_linear(lin, &[0xAB]);
        let mut b = [0u8; 1];
        mem.read_phys(PhysAddr::new(0x7c00), &mut b);
        assert_eq!(b, [0xAB]);
    }

    #[test]
    fn unbacked_reads_float_high() {
        let mem = mem();
        let mut buf = [0u8; 2];
        mem.read_phys(PhysAddr::new(0x10_0000), &mut buf);
        assert_eq!(buf, [0xFF, 0xFF]);
    }

    #[test]
    fn rejects_base_memory_larger_than_ram() {
        let err = PcLowMemory::new(PcLowMemoryConfig {
            ram_bytes: 0x1000,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, LowMemError::InvalidConfig(_)));
    }

    #[test]
    fn scheduled_relocation_is_consumed_once() {
        let mut mem = mem();
        assert!(!mem.relocate());
        mem.schedule_relocation(0x2000);
        assert!(mem.relocate());
        assert_eq!(mem.virt_offset(), 0x2000);
        assert!(!mem.relocate());
    }
}
