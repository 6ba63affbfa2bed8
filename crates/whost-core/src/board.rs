use std::path::Path;

use crate::bus::map::Interconnect;
use crate::dma::{DmaConfig, WhostDma};
use crate::intc::IrqSource;
use crate::memory::{PhysMemory, Ram};

/// Board devices, indexing [`MEMMAP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dev {
    Debug,
    Mrom,
    Clint,
    L2cc,
    Plic,
    Uart0,
    Sram,
    Flash,
    Dma,
    Gpio,
    Dram,
}

#[derive(Debug, Clone, Copy)]
pub struct MemmapEntry {
    pub base: u64,
    pub size: u64,
}

const fn entry(base: u64, size: u64) -> MemmapEntry {
    MemmapEntry { base, size }
}

/// Physical memory map. DRAM size comes from [`BoardConfig::dram_size`].
pub const MEMMAP: [MemmapEntry; 11] = [
    entry(0x0000_0000, 0x1000),      // DEBUG
    entry(0x0001_0000, 0x1_0000),    // MROM
    entry(0x0200_0000, 0x1_0000),    // CLINT
    entry(0x0201_0000, 0x1000),      // L2CC
    entry(0x0C00_0000, 0x400_0000),  // PLIC
    entry(0x5400_0000, 0x1000),      // UART0
    entry(0x6000_0000, 0x2_0000),    // SRAM
    entry(0x7000_0000, 0x800_0000),  // FLASH
    entry(0x9000_0000, 0x1000),      // DMA
    entry(0xA000_0010, 0x4),         // GPIO
    entry(0xC000_0000, 0x0),         // DRAM
];

pub fn memmap(dev: Dev) -> MemmapEntry {
    MEMMAP[dev as usize]
}

/// MSEL value that boots straight into SRAM.
pub const MSEL_DEBUG: u32 = 0x3;

/// Reset vector placed in MROM for debug boot: `lui a0, 0x60000; jr a0`.
const DEBUG_RESET_VEC: [u32; 2] = [0x6000_0537, 0x0000_8502];
const RESET_VEC_OFFSET: usize = 0x40;

pub const REGION_MROM: &str = "mrom";
pub const REGION_SRAM: &str = "sram";
pub const REGION_FLASH: &str = "flash";
pub const REGION_GPIO: &str = "gpio";
pub const REGION_DRAM: &str = "dram";

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no memory region named {0}")]
    UnknownRegion(&'static str),
    #[error("firmware is {size:#X} bytes but {region} holds {capacity:#X}")]
    FirmwareTooLarge {
        region: &'static str,
        size: usize,
        capacity: usize,
    },
}

/// Largest DRAM the board will build. Keeps every saved region, and the
/// save-state payload as a whole, addressable by its u32 length field.
pub const MAX_DRAM_SIZE: usize = 0x8000_0000;

#[derive(Debug, Clone, Copy)]
pub struct BoardConfig {
    /// Mode-select pins (MSEL[3:0]).
    pub msel: u32,
    /// Bytes of DRAM, capped at [`MAX_DRAM_SIZE`].
    pub dram_size: usize,
    /// Bytes of flash backing store, capped at the flash window.
    pub flash_size: usize,
    pub dma: DmaConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            msel: 0,
            dram_size: 16 * 1024 * 1024,
            flash_size: memmap(Dev::Flash).size as usize,
            dma: DmaConfig {
                base: memmap(Dev::Flash).base,
                irq: IrqSource::Dma as u32,
                ..DmaConfig::default()
            },
        }
    }
}

impl BoardConfig {
    /// DRAM actually mapped.
    pub fn dram_bytes(&self) -> usize {
        self.dram_size.min(MAX_DRAM_SIZE)
    }

    /// Flash backing actually mapped.
    pub fn flash_bytes(&self) -> usize {
        self.flash_size.min(memmap(Dev::Flash).size as usize)
    }
}

/// The Wavious Host board minus its harts.
///
/// Owns the memory regions, the DMA block and the interrupt aggregator.
pub struct WaviousHost {
    pub bus: Interconnect,
    pub msel: u32,
}

impl WaviousHost {
    pub fn new(config: BoardConfig) -> Self {
        let mut mem = PhysMemory::new();
        mem.map(
            memmap(Dev::Mrom).base,
            Ram::rom(REGION_MROM, memmap(Dev::Mrom).size as usize),
        );
        mem.map(
            memmap(Dev::Sram).base,
            Ram::new(REGION_SRAM, memmap(Dev::Sram).size as usize),
        );
        mem.map(
            memmap(Dev::Flash).base,
            Ram::new(REGION_FLASH, config.flash_bytes()),
        );
        if config.dram_size > MAX_DRAM_SIZE {
            log::warn!(
                "DRAM size {:#X} exceeds {:#X}, capping",
                config.dram_size,
                MAX_DRAM_SIZE
            );
        }
        let dram_size = config.dram_bytes();
        if dram_size > 0 {
            mem.map(memmap(Dev::Dram).base, Ram::new(REGION_DRAM, dram_size));
        }

        // MSEL is visible to firmware as a read-only word.
        let mut gpio = Ram::rom(REGION_GPIO, memmap(Dev::Gpio).size as usize);
        gpio.write_u32(0, config.msel);
        mem.map(memmap(Dev::Gpio).base, gpio);

        let dma = WhostDma::new(config.dma);
        let mut bus = Interconnect::new(mem, dma, memmap(Dev::Dma).base);
        let l2cc = memmap(Dev::L2cc);
        bus.add_unimplemented("l2cc", l2cc.base, l2cc.size);

        log::info!(
            "Wavious Host: msel={} dram={:#X} dma@{:#010X} base={:#010X} irq={}",
            config.msel,
            dram_size,
            memmap(Dev::Dma).base,
            config.dma.base,
            config.dma.irq
        );

        Self {
            bus,
            msel: config.msel,
        }
    }

    /// Place a firmware image where the boot ROM expects it.
    ///
    /// Debug MSEL loads into SRAM and plants a jump to SRAM at the MROM
    /// reset vector; every other mode loads the image at the MROM base.
    pub fn load_firmware(&mut self, image: &[u8]) -> Result<(), BoardError> {
        let region = if self.msel == MSEL_DEBUG {
            REGION_SRAM
        } else {
            REGION_MROM
        };
        self.load_region(region, 0, image)?;
        log::info!("Loaded {:#X} bytes of firmware into {}", image.len(), region);

        if self.msel == MSEL_DEBUG {
            let mut vec = Vec::with_capacity(DEBUG_RESET_VEC.len() * 4);
            for word in DEBUG_RESET_VEC {
                vec.extend_from_slice(&word.to_le_bytes());
            }
            self.load_region(REGION_MROM, RESET_VEC_OFFSET, &vec)?;
        }
        Ok(())
    }

    pub fn load_firmware_file(&mut self, path: &Path) -> Result<(), BoardError> {
        let image = std::fs::read(path)?;
        self.load_firmware(&image)
    }

    /// Copy a blob into a named region, bypassing ROM protection.
    pub fn load_region(
        &mut self,
        region: &'static str,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), BoardError> {
        let ram = self
            .bus
            .mem
            .region_mut(region)
            .ok_or(BoardError::UnknownRegion(region))?;
        let capacity = ram.len();
        if !ram.load(offset, bytes) {
            return Err(BoardError::FirmwareTooLarge {
                region,
                size: offset + bytes.len(),
                capacity,
            });
        }
        Ok(())
    }

    /// Physical address of the DMA register window.
    pub fn dma_window(&self) -> u64 {
        self.bus.dma_base()
    }

    /// System reset: devices back to defaults, memory untouched.
    pub fn reset(&mut self) {
        log::info!("Wavious Host: reset");
        self.bus.reset();
    }
}
