/// Register map of the Wavious Host DMA block.
///
/// All offsets are within a `REG_SIZE` (4 KiB) window; the device masks
/// incoming offsets to the low 12 bits before decoding.
pub const REG_SIZE: u64 = 0x1000;
pub const REG_WINDOW_MASK: u64 = REG_SIZE - 1;

pub const DMA_START: u64 = 0x000;
pub const DMA_CONTROLS: u64 = 0x004;
pub const DMA_SRC_ADDR: u64 = 0x008;
pub const DMA_LEN: u64 = 0x00C;
pub const DMA_DST_ADDR: u64 = 0x010;
pub const DMA_DST_ADDR_HI: u64 = 0x014;
pub const DMA_SETTINGS: u64 = 0x018;
pub const DMA_IRQ_EN: u64 = 0x054;
pub const DMA_IRQ_STA: u64 = 0x058;

// START
pub const START_TRIGGER: u32 = 1 << 0;
pub const START_MUX_START: u32 = 1 << 1;

// CONTROLS: max bytes moved per copy step
pub const CONTROLS_MAX_BYTES_MASK: u32 = 0xFF;

// SETTINGS (stored, not interpreted by the engine)
pub const SETTINGS_MR_MODE: u32 = 1 << 4;
pub const SETTINGS_MEM_MAP_MODE: u32 = 1 << 5;

// IRQ_EN
pub const IRQ_EN_DONE: u32 = 1 << 1;

// IRQ_STA
pub const IRQ_STA_DONE: u32 = 1 << 1;
pub const IRQ_STA_PENDING: u32 = 1 << 6;
/// Bits an IRQ_STA write can toggle. PENDING sits outside this mask and
/// only goes away through the collapse rule in [`DmaRegs::acknowledge`].
pub const IRQ_STA_ACK_MASK: u32 = 0x3F;

const RESET_CONTROL: u32 = 0x1FFF;
const RESET_LEN: u32 = 0x3FFF;

/// A decoded register offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Start,
    Controls,
    SrcAddr,
    Len,
    DstAddr,
    DstAddrHi,
    Settings,
    IrqEn,
    IrqSta,
}

impl Reg {
    pub const ALL: [Reg; 9] = [
        Reg::Start,
        Reg::Controls,
        Reg::SrcAddr,
        Reg::Len,
        Reg::DstAddr,
        Reg::DstAddrHi,
        Reg::Settings,
        Reg::IrqEn,
        Reg::IrqSta,
    ];

    /// Map a (window-masked) byte offset to a register.
    pub fn decode(offset: u64) -> Option<Reg> {
        match offset {
            DMA_START => Some(Reg::Start),
            DMA_CONTROLS => Some(Reg::Controls),
            DMA_SRC_ADDR => Some(Reg::SrcAddr),
            DMA_LEN => Some(Reg::Len),
            DMA_DST_ADDR => Some(Reg::DstAddr),
            DMA_DST_ADDR_HI => Some(Reg::DstAddrHi),
            DMA_SETTINGS => Some(Reg::Settings),
            DMA_IRQ_EN => Some(Reg::IrqEn),
            DMA_IRQ_STA => Some(Reg::IrqSta),
            _ => None,
        }
    }

    pub fn offset(self) -> u64 {
        match self {
            Reg::Start => DMA_START,
            Reg::Controls => DMA_CONTROLS,
            Reg::SrcAddr => DMA_SRC_ADDR,
            Reg::Len => DMA_LEN,
            Reg::DstAddr => DMA_DST_ADDR,
            Reg::DstAddrHi => DMA_DST_ADDR_HI,
            Reg::Settings => DMA_SETTINGS,
            Reg::IrqEn => DMA_IRQ_EN,
            Reg::IrqSta => DMA_IRQ_STA,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg::Start => "START",
            Reg::Controls => "CONTROLS",
            Reg::SrcAddr => "SRC_ADDR",
            Reg::Len => "LEN",
            Reg::DstAddr => "DST_ADDR",
            Reg::DstAddrHi => "DST_ADDR_HI",
            Reg::Settings => "SETTINGS",
            Reg::IrqEn => "IRQ_EN",
            Reg::IrqSta => "IRQ_STA",
        }
    }
}

/// Register state of one DMA block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegs {
    pub start: u32,
    pub control: u32,
    /// Source offset from the device's base address.
    pub src: u32,
    /// Transfer length minus one.
    pub len: u32,
    pub dst: u64,
    pub settings: u32,
    pub irq_en: u32,
    pub irq_sta: u32,
}

impl DmaRegs {
    /// Power-on / reset values.
    pub const fn reset_value() -> Self {
        Self {
            start: 0,
            control: RESET_CONTROL,
            src: 0,
            len: RESET_LEN,
            dst: 0,
            settings: 0,
            irq_en: 0,
            irq_sta: 0,
        }
    }

    /// Max bytes per copy step.
    pub fn chunk_size(&self) -> usize {
        (self.control & CONTROLS_MAX_BYTES_MASK) as usize
    }

    /// Bytes a transfer will move. Never zero.
    pub fn transfer_len(&self) -> u64 {
        self.len as u64 + 1
    }

    /// Latch completion: DONE and PENDING are always set together.
    pub fn set_done(&mut self) {
        self.irq_sta |= IRQ_STA_DONE | IRQ_STA_PENDING;
    }

    /// IRQ_STA write. Toggles the low six status bits; once only PENDING
    /// is left the whole register reads back as zero.
    pub fn acknowledge(&mut self, val: u32) {
        self.irq_sta ^= val & IRQ_STA_ACK_MASK;
        if self.irq_sta == IRQ_STA_PENDING {
            self.irq_sta = 0;
        }
    }

    /// Level of the DMA interrupt output.
    pub fn irq_level(&self) -> bool {
        self.irq_en & IRQ_EN_DONE != 0 && self.irq_sta & IRQ_STA_PENDING != 0
    }
}

impl Default for DmaRegs {
    fn default() -> Self {
        Self::reset_value()
    }
}
