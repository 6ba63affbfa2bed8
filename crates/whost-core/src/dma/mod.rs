/// Wavious Host DMA ("memory reader").
///
/// A single-channel copy engine with a 4 KiB register window. Writing
/// START with bit 0 set copies LEN+1 bytes from `base + SRC_ADDR` to
/// DST_ADDR before the write returns, then latches DONE|PENDING in
/// IRQ_STA. The interrupt output is `IRQ_EN.DONE && IRQ_STA.PENDING`
/// and is recomputed after every write that can change it.
///
/// Accesses are 4 or 8 bytes wide, little-endian. DST_ADDR is the only
/// width-sensitive register.
use crate::bus::{Bus, InterruptSink};
use regs::{START_TRIGGER, REG_WINDOW_MASK};

pub mod engine;
pub mod regs;

pub use engine::{ChunkAddressing, DmaError, Transfer};
pub use regs::{DmaRegs, Reg};

/// Default source base: the board's flash window.
pub const DEFAULT_BASE: u64 = 0x7000_0000;
/// Default interrupt source number on the board PLIC.
pub const DEFAULT_IRQ: u32 = 1;

/// Construction-time configuration. Immutable once the device exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaConfig {
    /// Added to SRC_ADDR to form the absolute source address.
    pub base: u64,
    /// Interrupt source driven by this block.
    pub irq: u32,
    pub addressing: ChunkAddressing,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            irq: DEFAULT_IRQ,
            addressing: ChunkAddressing::Fixed,
        }
    }
}

pub struct WhostDma {
    config: DmaConfig,
    pub regs: DmaRegs,
    /// Last level driven onto the interrupt line.
    irq_level: bool,
    /// Debug: completed transfers since construction.
    pub transfer_count: u32,
    /// Debug: transfers refused because CONTROLS had a zero chunk size.
    pub rejected_count: u32,
}

impl WhostDma {
    pub fn new(config: DmaConfig) -> Self {
        Self {
            config,
            regs: DmaRegs::reset_value(),
            irq_level: false,
            transfer_count: 0,
            rejected_count: 0,
        }
    }

    pub fn config(&self) -> &DmaConfig {
        &self.config
    }

    pub fn base(&self) -> u64 {
        self.config.base
    }

    /// Level currently driven on the interrupt output.
    pub fn irq_level(&self) -> bool {
        self.irq_level
    }

    /// Restore reset values and drop the interrupt line.
    pub fn reset<I: InterruptSink>(&mut self, irq: &mut I) {
        self.regs = DmaRegs::reset_value();
        self.update_irq(irq);
    }

    /// Replace the whole register file (save-state restore) and
    /// recompute the line from it.
    pub fn load_regs<I: InterruptSink>(&mut self, regs: DmaRegs, irq: &mut I) {
        self.regs = regs;
        self.update_irq(irq);
    }

    pub fn read(&self, offset: u64, size: u32) -> u64 {
        let offset = offset & REG_WINDOW_MASK;
        let Some(reg) = Reg::decode(offset) else {
            log::warn!("DMA read: bad offset {:#05X} (size {})", offset, size);
            return 0;
        };
        match reg {
            Reg::Start => self.regs.start as u64,
            Reg::Controls => self.regs.control as u64,
            Reg::SrcAddr => self.regs.src as u64,
            Reg::Len => self.regs.len as u64,
            Reg::DstAddr => {
                if size == 4 {
                    self.regs.dst & 0xFFFF_FFFF
                } else {
                    self.regs.dst
                }
            }
            Reg::DstAddrHi => self.regs.dst >> 32,
            Reg::Settings => self.regs.settings as u64,
            Reg::IrqEn => self.regs.irq_en as u64,
            Reg::IrqSta => self.regs.irq_sta as u64,
        }
    }

    /// Register write. A START write with the trigger bit runs the whole
    /// transfer through `mem` before returning.
    pub fn write<B: Bus, I: InterruptSink>(
        &mut self,
        offset: u64,
        val: u64,
        size: u32,
        mem: &mut B,
        irq: &mut I,
    ) {
        let offset = offset & REG_WINDOW_MASK;
        let Some(reg) = Reg::decode(offset) else {
            log::warn!(
                "DMA write: bad offset {:#05X} val={:#X} (size {})",
                offset,
                val,
                size
            );
            return;
        };
        log::debug!("DMA write: {}={:#X} (size {})", reg.name(), val, size);

        match reg {
            Reg::Start => {
                self.regs.start = val as u32;
                if self.regs.start & START_TRIGGER != 0 {
                    self.run(mem);
                }
                self.update_irq(irq);
            }
            Reg::Controls => self.regs.control = val as u32,
            Reg::SrcAddr => self.regs.src = val as u32,
            Reg::Len => self.regs.len = val as u32,
            Reg::DstAddr => {
                if size == 4 {
                    self.regs.dst = (self.regs.dst & 0xFFFF_FFFF_0000_0000) | (val & 0xFFFF_FFFF);
                } else {
                    self.regs.dst = val;
                }
            }
            Reg::DstAddrHi => {
                self.regs.dst = (self.regs.dst & 0xFFFF_FFFF) | (val << 32);
            }
            Reg::Settings => self.regs.settings = val as u32,
            Reg::IrqEn => {
                self.regs.irq_en = val as u32;
                self.update_irq(irq);
            }
            Reg::IrqSta => {
                self.regs.acknowledge(val as u32);
                self.update_irq(irq);
            }
        }
    }

    fn run<B: Bus>(&mut self, mem: &mut B) {
        let transfer = Transfer::from_regs(&self.regs, self.config.base);
        log::debug!(
            "DMA #{}: {:#010X} -> {:#010X}, len={:#X}, chunk={}",
            self.transfer_count.wrapping_add(1),
            transfer.src,
            transfer.dst,
            transfer.len,
            transfer.chunk
        );

        match transfer.run(self.config.addressing, mem) {
            Ok(_) => {
                self.regs.set_done();
                self.transfer_count = self.transfer_count.wrapping_add(1);
            }
            Err(e) => {
                log::error!("DMA: transfer refused: {}", e);
                self.rejected_count = self.rejected_count.wrapping_add(1);
            }
        }
    }

    fn update_irq<I: InterruptSink>(&mut self, irq: &mut I) {
        self.irq_level = self.regs.irq_level();
        irq.set_line(self.config.irq, self.irq_level);
    }
}

#[cfg(test)]
mod tests {
    use super::regs::*;
    use super::*;

    struct TestBus {
        mem: Vec<u8>,
        max_access: usize,
    }

    impl TestBus {
        fn new(size: usize) -> Self {
            Self {
                mem: vec![0; size],
                max_access: 0,
            }
        }
    }

    impl Bus for TestBus {
        fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
            let i = addr as usize;
            buf.copy_from_slice(&self.mem[i..i + buf.len()]);
        }

        fn write_bytes(&mut self, addr: u64, data: &[u8]) {
            let i = addr as usize;
            self.mem[i..i + data.len()].copy_from_slice(data);
            self.max_access = self.max_access.max(data.len());
        }
    }

    /// Records every level driven onto each line.
    #[derive(Default)]
    struct TestIrq {
        events: Vec<(u32, bool)>,
    }

    impl TestIrq {
        fn level(&self) -> Option<bool> {
            self.events.last().map(|&(_, l)| l)
        }
    }

    impl InterruptSink for TestIrq {
        fn set_line(&mut self, id: u32, level: bool) {
            self.events.push((id, level));
        }
    }

    const BASE: u64 = 0x100;

    fn setup() -> (WhostDma, TestBus, TestIrq) {
        let dma = WhostDma::new(DmaConfig {
            base: BASE,
            ..DmaConfig::default()
        });
        let mut bus = TestBus::new(0x400);
        for (i, b) in bus.mem[BASE as usize..].iter_mut().enumerate() {
            *b = i as u8 ^ 0xA5;
        }
        (dma, bus, TestIrq::default())
    }

    fn w32(dma: &mut WhostDma, bus: &mut TestBus, irq: &mut TestIrq, off: u64, val: u32) {
        dma.write(off, val as u64, 4, bus, irq);
    }

    #[test]
    fn reset_values_read_back() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_SETTINGS, SETTINGS_MR_MODE);
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, IRQ_EN_DONE);
        dma.reset(&mut irq);

        assert_eq!(dma.read(DMA_START, 4), 0);
        assert_eq!(dma.read(DMA_CONTROLS, 4), 0x1FFF);
        assert_eq!(dma.read(DMA_SRC_ADDR, 4), 0);
        assert_eq!(dma.read(DMA_LEN, 4), 0x3FFF);
        assert_eq!(dma.read(DMA_DST_ADDR, 8), 0);
        assert_eq!(dma.read(DMA_SETTINGS, 4), 0);
        assert_eq!(dma.read(DMA_IRQ_EN, 4), 0);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0);
        assert_eq!(irq.level(), Some(false));
    }

    #[test]
    fn plain_registers_round_trip() {
        let (mut dma, mut bus, mut irq) = setup();
        let cases = [
            (DMA_CONTROLS, 0x0000_1F40),
            (DMA_SRC_ADDR, 0x0123_4567),
            (DMA_LEN, 0x0000_00FF),
            (DMA_SETTINGS, SETTINGS_MR_MODE | SETTINGS_MEM_MAP_MODE),
            (DMA_IRQ_EN, 0xFFFF_FFFF),
            (DMA_START, START_MUX_START),
        ];
        for (off, val) in cases {
            w32(&mut dma, &mut bus, &mut irq, off, val);
            assert_eq!(dma.read(off, 4), val as u64, "offset {:#X}", off);
        }
        // A bare MUX_START doesn't run anything.
        assert_eq!(dma.transfer_count, 0);
    }

    #[test]
    fn values_are_truncated_to_register_width() {
        let (mut dma, mut bus, mut irq) = setup();
        dma.write(DMA_SRC_ADDR, 0xFFFF_FFFF_0000_0010, 8, &mut bus, &mut irq);
        assert_eq!(dma.read(DMA_SRC_ADDR, 8), 0x10);
    }

    #[test]
    fn destination_split_halves() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR_HI, 0x1);
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR, 0x2);
        assert_eq!(dma.regs.dst, 0x1_0000_0002);
        assert_eq!(dma.read(DMA_DST_ADDR, 8), 0x1_0000_0002);
        assert_eq!(dma.read(DMA_DST_ADDR, 4), 0x2);
        assert_eq!(dma.read(DMA_DST_ADDR_HI, 4), 0x1);

        // Rewriting the high half keeps the low half.
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR_HI, 0xABCD);
        assert_eq!(dma.regs.dst, 0xABCD_0000_0002);
    }

    #[test]
    fn wide_destination_write_replaces_everything() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR_HI, 0xFFFF_FFFF);
        dma.write(DMA_DST_ADDR, 0x0000_0002_8000_0000, 8, &mut bus, &mut irq);
        assert_eq!(dma.read(DMA_DST_ADDR, 8), 0x2_8000_0000);
        assert_eq!(dma.read(DMA_DST_ADDR_HI, 4), 0x2);
    }

    #[test]
    fn offsets_are_masked_to_window() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, 0x9000_0000 + DMA_LEN, 0x77);
        assert_eq!(dma.read(DMA_LEN, 4), 0x77);
        assert_eq!(dma.read(0x1000 + DMA_LEN, 4), 0x77);
    }

    #[test]
    fn undefined_offsets_read_zero_and_ignore_writes() {
        let (mut dma, mut bus, mut irq) = setup();
        let before = dma.regs;
        for off in [0x01C, 0x050, 0x05C, 0xFFC, 0x002] {
            w32(&mut dma, &mut bus, &mut irq, off, 0xFFFF_FFFF);
            assert_eq!(dma.read(off, 4), 0);
        }
        assert_eq!(dma.regs, before);
        assert!(irq.events.is_empty());
    }

    #[test]
    fn end_to_end_transfer() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_SRC_ADDR, 0x10);
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 15);
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR, 0x300);
        w32(&mut dma, &mut bus, &mut irq, DMA_CONTROLS, 0x1F04);
        let untouched = bus.mem[0x304..0x310].to_vec();
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);

        assert_eq!(dma.transfer_count, 1);
        assert_eq!(bus.max_access, 4);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0x42);
        // START keeps the value written.
        assert_eq!(dma.read(DMA_START, 4), START_TRIGGER as u64);

        // Fixed addressing: the first 4 source bytes land at the destination.
        let src = (BASE + 0x10) as usize;
        assert_eq!(&bus.mem[0x300..0x304], &bus.mem[src..src + 4]);
        assert_eq!(&bus.mem[0x304..0x310], &untouched[..]);

        // IRQ_EN is clear, so the line was driven low.
        assert_eq!(irq.events, vec![(DEFAULT_IRQ, false)]);
    }

    #[test]
    fn incrementing_transfer_copies_all_bytes() {
        let mut dma = WhostDma::new(DmaConfig {
            base: BASE,
            addressing: ChunkAddressing::Incrementing,
            ..DmaConfig::default()
        });
        let (_, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_SRC_ADDR, 0x10);
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 15);
        w32(&mut dma, &mut bus, &mut irq, DMA_DST_ADDR, 0x300);
        w32(&mut dma, &mut bus, &mut irq, DMA_CONTROLS, 4);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);

        let src = (BASE + 0x10) as usize;
        let expected = bus.mem[src..src + 16].to_vec();
        assert_eq!(&bus.mem[0x300..0x310], &expected[..]);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0x42);
    }

    #[test]
    fn interrupt_follows_enable_and_pending() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 0);
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, IRQ_EN_DONE);
        assert_eq!(irq.level(), Some(false));

        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);
        assert!(dma.irq_level());
        assert_eq!(irq.level(), Some(true));

        // Dropping the enable lowers the line; status stays latched.
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, 0);
        assert_eq!(irq.level(), Some(false));
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0x42);

        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, IRQ_EN_DONE);
        assert_eq!(irq.level(), Some(true));

        // Acknowledging DONE collapses the status and lowers the line.
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_STA, IRQ_STA_DONE);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0);
        assert_eq!(irq.level(), Some(false));
        assert!(!dma.irq_level());
    }

    #[test]
    fn partial_acknowledge_keeps_line_up() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 0);
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, IRQ_EN_DONE);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);

        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_STA, 0x01);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0x43);
        assert_eq!(irq.level(), Some(true));
    }

    #[test]
    fn control_writes_do_not_touch_the_line() {
        let (mut dma, mut bus, mut irq) = setup();
        for off in [DMA_CONTROLS, DMA_SRC_ADDR, DMA_LEN, DMA_DST_ADDR, DMA_DST_ADDR_HI, DMA_SETTINGS] {
            w32(&mut dma, &mut bus, &mut irq, off, 1);
        }
        assert!(irq.events.is_empty());
    }

    #[test]
    fn zero_chunk_is_refused_but_line_recomputed() {
        let (mut dma, mut bus, mut irq) = setup();
        let snapshot = bus.mem.clone();
        w32(&mut dma, &mut bus, &mut irq, DMA_CONTROLS, 0x1F00);
        w32(&mut dma, &mut bus, &mut irq, DMA_IRQ_EN, IRQ_EN_DONE);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);

        assert_eq!(bus.mem, snapshot);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0);
        assert_eq!(dma.transfer_count, 0);
        assert_eq!(dma.rejected_count, 1);
        assert_eq!(irq.events.last(), Some(&(DEFAULT_IRQ, false)));
    }

    #[test]
    fn second_transfer_keeps_status_latched() {
        let (mut dma, mut bus, mut irq) = setup();
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 3);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER | START_MUX_START);
        assert_eq!(dma.transfer_count, 2);
        assert_eq!(dma.read(DMA_IRQ_STA, 4), 0x42);
        assert_eq!(dma.read(DMA_START, 4), 0x3);
    }

    #[test]
    fn debug_counters_wrap_instead_of_overflowing() {
        let (mut dma, mut bus, mut irq) = setup();
        dma.transfer_count = u32::MAX;
        dma.rejected_count = u32::MAX;
        w32(&mut dma, &mut bus, &mut irq, DMA_LEN, 0);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);
        assert_eq!(dma.transfer_count, 0);

        w32(&mut dma, &mut bus, &mut irq, DMA_CONTROLS, 0);
        w32(&mut dma, &mut bus, &mut irq, DMA_START, START_TRIGGER);
        assert_eq!(dma.rejected_count, 0);
    }
}
