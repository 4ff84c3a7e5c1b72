use crate::addr::{LinearAddr, PhysAddr, RealAddr};
use crate::error::Result;

/// Mapping between the protected-mode linear view and physical memory, plus raw byte transfer.
///
/// Everything that touches stub memory or the real-mode stack goes through this trait; the mapping
/// is allowed to change whenever the hosting program relocates itself.
pub trait AddressTranslator {
    fn phys_to_linear(&self, addr: PhysAddr) -> LinearAddr;
    fn linear_to_phys(&self, addr: LinearAddr) -> PhysAddr;

    fn read_linear(&self, addr: LinearAddr, dst: &mut [u8]);
    fn write_linear(&mut self, addr: LinearAddr, src: &[u8]);

    /// Copy `src` to a real-mode `segment:offset` location.
    fn copy_to_real(&mut self, dst: RealAddr, src: &[u8]) {
        let linear = self.phys_to_linear(dst.to_phys());
        self.write_linear(linear, src);
    }

    /// Copy bytes from a real-mode `segment:offset` location into `dst`.
    fn copy_from_real(&self, dst: &mut [u8], src: RealAddr) {
        let linear = self.phys_to_linear(src.to_phys());
        self.read_linear(linear, dst);
    }

    fn read_u16_linear(&self, addr: LinearAddr) -> u16 {
        let mut buf = [0u8; 2];
        self.read_linear(addr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn write_u16_linear(&mut self, addr: LinearAddr, value: u16) {
        self.write_linear(addr, &value.to_le_bytes());
    }
}

/// Allocator for conventional ("base") memory below 640KiB.
///
/// Regions are handed out as linear addresses in the current mapping. Callers must free exactly
/// the `(addr, size)` pair they were given.
pub trait LowMemAllocator {
    fn allocate_base_memory(&mut self, size: usize) -> Result<LinearAddr>;
    fn free_base_memory(&mut self, addr: LinearAddr, size: usize);
}

/// The hosting program's self-relocation mechanism.
pub trait ImageRelocator {
    /// Move the program image. Returns `true` when the linear/physical mapping changed.
    fn relocate(&mut self) -> bool;
}
