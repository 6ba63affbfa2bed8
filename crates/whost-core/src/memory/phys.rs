/// Physical address space: a set of non-overlapping RAM/ROM regions.
///
/// This is what the DMA engine sees through the [`Bus`] trait. Reads of
/// unbacked addresses return zero, writes to ROM or unbacked addresses
/// are dropped. Both are logged as guest errors; neither fails.
use super::ram::Ram;
use crate::bus::Bus;

struct Mapping {
    base: u64,
    ram: Ram,
}

impl Mapping {
    fn end(&self) -> u64 {
        self.base + self.ram.len() as u64
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }
}

pub struct PhysMemory {
    regions: Vec<Mapping>,
}

impl PhysMemory {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Map `ram` at physical address `base`.
    ///
    /// Panics if the new region overlaps an existing one; the board map
    /// is static, so an overlap is a programming error.
    pub fn map(&mut self, base: u64, ram: Ram) {
        let end = base + ram.len() as u64;
        if let Some(m) = self
            .regions
            .iter()
            .find(|m| base < m.end() && m.base < end)
        {
            panic!(
                "region {} at {:#X} overlaps {} at {:#X}",
                ram.name(),
                base,
                m.ram.name(),
                m.base
            );
        }
        log::debug!(
            "map {} at {:#010X}..{:#010X}",
            ram.name(),
            base,
            end
        );
        self.regions.push(Mapping { base, ram });
        self.regions.sort_by_key(|m| m.base);
    }

    /// Look up a mapped region by name.
    pub fn region(&self, name: &str) -> Option<&Ram> {
        self.regions
            .iter()
            .find(|m| m.ram.name() == name)
            .map(|m| &m.ram)
    }

    pub fn region_mut(&mut self, name: &str) -> Option<&mut Ram> {
        self.regions
            .iter_mut()
            .find(|m| m.ram.name() == name)
            .map(|m| &mut m.ram)
    }

    fn find(&self, addr: u64) -> Option<usize> {
        self.regions.iter().position(|m| m.contains(addr))
    }

    /// Bytes from `addr` to the next region boundary (or to the next
    /// mapped region if `addr` is unbacked), capped at `max`.
    fn span(&self, addr: u64, max: usize) -> usize {
        let limit = match self.find(addr) {
            Some(i) => self.regions[i].end() - addr,
            None => self
                .regions
                .iter()
                .find(|m| m.base > addr)
                .map_or(u64::MAX, |m| m.base - addr),
        };
        limit.min(max as u64) as usize
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    pub fn read_u64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    pub fn write_u32(&mut self, addr: u64, val: u32) {
        self.write_bytes(addr, &val.to_le_bytes());
    }

    pub fn write_u64(&mut self, addr: u64, val: u64) {
        self.write_bytes(addr, &val.to_le_bytes());
    }
}

impl Default for PhysMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for PhysMemory {
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        let mut done = 0;
        while done < buf.len() {
            let cur = addr.wrapping_add(done as u64);
            let n = self.span(cur, buf.len() - done);
            match self.find(cur) {
                Some(i) => {
                    let m = &self.regions[i];
                    let off = (cur - m.base) as usize;
                    buf[done..done + n].copy_from_slice(&m.ram.data()[off..off + n]);
                }
                None => {
                    log::warn!("phys read: unmapped address {:#010X} ({} bytes)", cur, n);
                    buf[done..done + n].fill(0);
                }
            }
            done += n;
        }
    }

    fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        let mut done = 0;
        while done < data.len() {
            let cur = addr.wrapping_add(done as u64);
            let n = self.span(cur, data.len() - done);
            match self.find(cur) {
                Some(i) => {
                    let m = &mut self.regions[i];
                    if m.ram.is_read_only() {
                        log::warn!(
                            "phys write: {} is read-only, dropped {} bytes at {:#010X}",
                            m.ram.name(),
                            n,
                            cur
                        );
                    } else {
                        let off = (cur - m.base) as usize;
                        m.ram.data_mut()[off..off + n].copy_from_slice(&data[done..done + n]);
                    }
                }
                None => {
                    log::warn!("phys write: unmapped address {:#010X} ({} bytes)", cur, n);
                }
            }
            done += n;
        }
    }
}
