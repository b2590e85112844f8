use serde::{Deserialize, Serialize};

/// 20-bit physical address space.
pub const ADDRESS_MASK: u32 = 0xF_FFFF;
/// Value read from addresses no region claims.
pub const OPEN_BUS: u8 = 0xFF;

pub fn linear(segment: u16, offset: u16) -> u32 {
    ((segment as u32) << 4).wrapping_add(offset as u32) & ADDRESS_MASK
}

pub trait Memory {
    fn read_u8(&self, addr: u32) -> u8;
    fn write_u8(&mut self, addr: u32, val: u8);

    fn read_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read_u8(addr), self.read_u8((addr + 1) & ADDRESS_MASK)])
    }

    fn write_u16(&mut self, addr: u32, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write_u8(addr, lo);
        self.write_u8((addr + 1) & ADDRESS_MASK, hi);
    }
}

/// A contiguous block of the address space.
#[derive(Clone, Serialize, Deserialize)]
pub struct Region {
    pub mem: Vec<u8>,
    pub base: u32,
    pub read_only: bool,
}

impl Region {
    pub fn ram(base: u32, size: usize) -> Self {
        Self {
            mem: vec![0; size],
            base,
            read_only: false,
        }
    }

    pub fn rom(base: u32, image: Vec<u8>) -> Self {
        Self {
            mem: image,
            base,
            read_only: true,
        }
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && ((addr - self.base) as usize) < self.mem.len()
    }

    pub fn end(&self) -> u32 {
        self.base + self.mem.len() as u32
    }

    fn load_le_u16(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.mem[off], self.mem[off + 1]])
    }

    fn store_le_u16(&mut self, off: usize, v: u16) {
        self.mem[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("base", &format_args!("{:05X}h", self.base))
            .field("len", &self.mem.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl Memory for Region {
    fn read_u8(&self, addr: u32) -> u8 {
        if self.contains(addr) {
            self.mem[(addr - self.base) as usize]
        } else {
            OPEN_BUS
        }
    }

    fn write_u8(&mut self, addr: u32, val: u8) {
        if !self.read_only && self.contains(addr) {
            self.mem[(addr - self.base) as usize] = val;
        }
    }

    fn read_u16(&self, addr: u32) -> u16 {
        if self.contains(addr) && self.contains(addr + 1) {
            self.load_le_u16((addr - self.base) as usize)
        } else {
            u16::from_le_bytes([self.read_u8(addr), self.read_u8((addr + 1) & ADDRESS_MASK)])
        }
    }

    fn write_u16(&mut self, addr: u32, val: u16) {
        if self.read_only {
            return;
        }
        if self.contains(addr) && self.contains(addr + 1) {
            self.store_le_u16((addr - self.base) as usize, val);
        } else {
            let [lo, hi] = val.to_le_bytes();
            self.write_u8(addr, lo);
            self.write_u8((addr + 1) & ADDRESS_MASK, hi);
        }
    }
}

/// Address space built from RAM and ROM regions. A later region shadows
/// any earlier region it overlaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappedMemory {
    regions: Vec<Region>,
}

impl MappedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, region: Region) {
        tracing::debug!(
            base = format_args!("{:05X}h", region.base),
            len = region.mem.len(),
            rom = region.read_only,
            "map region"
        );
        self.regions.push(region);
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn region(&self, addr: u32) -> Option<&Region> {
        self.regions.iter().rev().find(|r| r.contains(addr))
    }

    fn region_mut(&mut self, addr: u32) -> Option<&mut Region> {
        self.regions.iter_mut().rev().find(|r| r.contains(addr))
    }

    /// Copy `bytes` in starting at `addr`. ROM regions ignore the write.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.write_u8((addr + i as u32) & ADDRESS_MASK, *b);
        }
    }
}

impl Memory for MappedMemory {
    fn read_u8(&self, addr: u32) -> u8 {
        let addr = addr & ADDRESS_MASK;
        self.region(addr).map_or(OPEN_BUS, |r| r.read_u8(addr))
    }

    fn write_u8(&mut self, addr: u32, val: u8) {
        let addr = addr & ADDRESS_MASK;
        match self.region_mut(addr) {
            Some(r) => r.write_u8(addr, val),
            None => tracing::trace!(addr = format_args!("{:05X}h", addr), "write to unmapped address"),
        }
    }

    fn read_u16(&self, addr: u32) -> u16 {
        let addr = addr & ADDRESS_MASK;
        let next = (addr + 1) & ADDRESS_MASK;
        match self.region(addr) {
            Some(r) if r.contains(next) => r.read_u16(addr),
            _ => u16::from_le_bytes([self.read_u8(addr), self.read_u8(next)]),
        }
    }

    fn write_u16(&mut self, addr: u32, val: u16) {
        let addr = addr & ADDRESS_MASK;
        let next = (addr + 1) & ADDRESS_MASK;
        match self.region_mut(addr) {
            Some(r) if r.contains(next) => r.write_u16(addr, val),
            _ => {
                let [lo, hi] = val.to_le_bytes();
                self.write_u8(addr, lo);
                self.write_u8(next, hi);
            }
        }
    }
}
