use crate::bus::Bus;
use crate::dma::regs::REG_SIZE as DMA_REG_SIZE;
use crate::dma::WhostDma;
use crate::intc::Plic;
use crate::memory::PhysMemory;

/// An MMIO window that reads as zero and swallows writes.
pub struct Unimplemented {
    pub name: &'static str,
    pub base: u64,
    pub size: u64,
}

impl Unimplemented {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// The concrete bus that wires the board's devices together.
/// Physical address dispatch for CPU-side accesses happens here.
///
/// The DMA block is a bus master as well as a slave: register writes
/// hand it the physical memory and the interrupt aggregator so a START
/// write can finish the copy and update the line before returning.
pub struct Interconnect {
    pub mem: PhysMemory,
    pub dma: WhostDma,
    pub plic: Plic,
    dma_base: u64,
    unimplemented: Vec<Unimplemented>,
}

fn valid_size(size: u32) -> bool {
    matches!(size, 1 | 2 | 4 | 8)
}

fn size_mask(size: u32) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

impl Interconnect {
    pub fn new(mem: PhysMemory, dma: WhostDma, dma_base: u64) -> Self {
        Self {
            mem,
            dma,
            plic: Plic::new(),
            dma_base,
            unimplemented: Vec::new(),
        }
    }

    /// Register a stub device window (accesses are logged and ignored).
    pub fn add_unimplemented(&mut self, name: &'static str, base: u64, size: u64) {
        self.unimplemented.push(Unimplemented { name, base, size });
    }

    /// Physical address of the DMA register window.
    pub fn dma_base(&self) -> u64 {
        self.dma_base
    }

    fn in_dma_window(&self, addr: u64) -> bool {
        addr >= self.dma_base && addr - self.dma_base < DMA_REG_SIZE
    }

    fn unimplemented_at(&self, addr: u64) -> Option<&Unimplemented> {
        self.unimplemented.iter().find(|u| u.contains(addr))
    }

    /// CPU-side read of `size` bytes (1, 2, 4 or 8).
    ///
    /// Other sizes are a guest error and read as zero. The DMA window only
    /// decodes 4- and 8-byte accesses; narrower reads fetch the aligned
    /// 32-bit register and return the addressed byte lane.
    pub fn read(&self, addr: u64, size: u32) -> u64 {
        if !valid_size(size) {
            log::warn!("bus read: invalid size {} at {:#010X}", size, addr);
            return 0;
        }
        if self.in_dma_window(addr) {
            let offset = addr - self.dma_base;
            if size >= 4 {
                return self.dma.read(offset, size);
            }
            let word = self.dma.read(offset & !3, 4);
            let shift = (offset & 3) * 8;
            return (word >> shift) & size_mask(size);
        }
        if let Some(dev) = self.unimplemented_at(addr) {
            log::debug!(
                "{}: unimplemented read at {:#X} (size {})",
                dev.name,
                addr - dev.base,
                size
            );
            return 0;
        }
        let mut buf = [0u8; 8];
        self.mem.read_bytes(addr, &mut buf[..size as usize]);
        u64::from_le_bytes(buf)
    }

    /// CPU-side write of the low `size` bytes of `val`.
    ///
    /// Invalid sizes, and writes narrower than 4 bytes into the DMA
    /// window, are dropped with a guest-error warning.
    pub fn write(&mut self, addr: u64, val: u64, size: u32) {
        if !valid_size(size) {
            log::warn!(
                "bus write: invalid size {} at {:#010X} val={:#X}",
                size,
                addr,
                val
            );
            return;
        }
        if self.in_dma_window(addr) {
            if size < 4 {
                log::warn!(
                    "DMA write: {}-byte access at {:#05X} dropped",
                    size,
                    addr - self.dma_base
                );
                return;
            }
            self.dma.write(
                addr - self.dma_base,
                val & size_mask(size),
                size,
                &mut self.mem,
                &mut self.plic,
            );
            return;
        }
        if let Some(dev) = self.unimplemented_at(addr) {
            log::debug!(
                "{}: unimplemented write at {:#X} val={:#X} (size {})",
                dev.name,
                addr - dev.base,
                val,
                size
            );
            return;
        }
        let bytes = val.to_le_bytes();
        self.mem.write_bytes(addr, &bytes[..size as usize]);
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        self.read(addr, 4) as u32
    }

    pub fn read_u64(&self, addr: u64) -> u64 {
        self.read(addr, 8)
    }

    pub fn write_u32(&mut self, addr: u64, val: u32) {
        self.write(addr, val as u64, 4);
    }

    pub fn write_u64(&mut self, addr: u64, val: u64) {
        self.write(addr, val, 8);
    }

    /// True while the DMA interrupt is asserted at the aggregator.
    pub fn dma_irq_pending(&self) -> bool {
        self.plic.is_asserted(self.dma.config().irq)
    }

    /// Reset the devices. Memory contents survive, as on a warm reset.
    pub fn reset(&mut self) {
        self.plic.reset();
        self.dma.reset(&mut self.plic);
    }
}
