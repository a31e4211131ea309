//! Memory module interface.

use crate::Address;
use crate::Primitive;

/// Trait for read-only views into the emulated address space.
pub trait MemoryModule {
    /// Fills `buf` with the bytes starting at `addr`. Returns `false` if any of them is not
    /// mapped, in which case the contents of `buf` are unspecified.
    fn read(&self, addr: Address, buf: &mut [u8]) -> bool;
}

impl dyn MemoryModule + '_ {
    /// Reads a primitive at `addr`, or `None` if it is unmapped.
    pub fn read_primitive<P: Primitive>(&self, addr: Address) -> Option<P> {
        let mut buf = [0; 4];
        let buf = &mut buf[..P::SIZE as usize];
        self.read(addr, buf).then(|| P::read_le_bytes(buf))
    }
}

/// An implementation of [`MemoryModule`] with nothing mapped.
#[derive(Debug, Clone, Copy)]
pub struct NopMemoryModule;

impl MemoryModule for NopMemoryModule {
    fn read(&self, _: Address, _: &mut [u8]) -> bool {
        false
    }
}

/// A region of [`MappedMemory`].
#[derive(Debug, Clone)]
struct Region {
    base: Address,
    data: Vec<u8>,
}

impl Region {
    fn contains(&self, addr: Address, len: usize) -> bool {
        let offset = addr - self.base;
        (offset as usize).saturating_add(len) <= self.data.len() && addr >= self.base
    }
}

/// A [`MemoryModule`] backed by a set of plain byte regions, like memory dumps of a running
/// system.
#[derive(Debug, Clone, Default)]
pub struct MappedMemory {
    regions: Vec<Region>,
}

impl MappedMemory {
    /// Maps `data` at `base`. Later mappings take priority over earlier ones when they overlap.
    pub fn map(&mut self, base: Address, data: Vec<u8>) {
        tracing::debug!(%base, len = data.len(), "mapping memory region");
        self.regions.push(Region { base, data });
    }

    /// Builder style version of [`MappedMemory::map`].
    pub fn with(mut self, base: Address, data: Vec<u8>) -> Self {
        self.map(base, data);
        self
    }
}

impl MemoryModule for MappedMemory {
    fn read(&self, addr: Address, buf: &mut [u8]) -> bool {
        let Some(region) = self
            .regions
            .iter()
            .rev()
            .find(|r| r.contains(addr, buf.len()))
        else {
            return false;
        };

        let offset = (addr - region.base) as usize;
        buf.copy_from_slice(&region.data[offset..offset + buf.len()]);
        true
    }
}
