/// Save states: snapshot and restore board state.
///
/// Binary format (little-endian):
///   [0..4]   Magic: "WHDS"
///   [4..8]   Version: u32
///   [8..16]  DMA base: u64 (checked against the running board)
///   [16..20] Data size: u32 (total bytes after header)
///   [20..]   State data (DMA registers, line level, RAM regions)
///
/// MROM and the GPIO word are not saved: they are fixed at board build
/// and firmware load time.
use std::io;
use std::path::Path;

use crate::board::{WaviousHost, REGION_DRAM, REGION_FLASH, REGION_SRAM};
use crate::dma::DmaRegs;

const MAGIC: &[u8; 4] = b"WHDS";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 20;

/// RAM regions saved, in file order.
const SAVED_REGIONS: [&str; 3] = [REGION_SRAM, REGION_FLASH, REGION_DRAM];

struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed blob.
    fn blob(&mut self, data: &[u8]) {
        self.u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(word))
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(word))
    }

    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_bytes(1)?[0] != 0)
    }
}

/// Capture the board state into a byte buffer.
pub fn capture(board: &WaviousHost) -> Vec<u8> {
    let mut w = StateWriter::new();
    let dma = &board.bus.dma;

    let regs = &dma.regs;
    for word in [regs.start, regs.control, regs.src, regs.len] {
        w.u32(word);
    }
    w.u64(regs.dst);
    for word in [regs.settings, regs.irq_en, regs.irq_sta] {
        w.u32(word);
    }
    w.buf.push(dma.irq_level() as u8);

    // Region sizes are capped by the board (see `MAX_DRAM_SIZE`), so
    // each length and the payload total fit in u32. Absent regions are
    // saved as empty blobs.
    for name in SAVED_REGIONS {
        w.blob(board.bus.mem.region(name).map_or(&[][..], |ram| ram.data()));
    }

    let data = w.into_bytes();
    let mut file = Vec::with_capacity(HEADER_SIZE + data.len());
    file.extend_from_slice(MAGIC);
    file.extend_from_slice(&VERSION.to_le_bytes());
    file.extend_from_slice(&dma.base().to_le_bytes());
    file.extend_from_slice(&(data.len() as u32).to_le_bytes());
    file.extend_from_slice(&data);
    file
}

/// Rejects incompatible versions and truncated files. Warns on a DMA
/// base mismatch but allows loading.
fn validate_header(
    file_version: u32,
    file_base: u64,
    current_base: u64,
    data_len: u32,
    actual_len: usize,
) -> Result<(), String> {
    if file_version > VERSION {
        return Err(format!(
            "Save state version {} is newer than supported ({})",
            file_version, VERSION
        ));
    }
    if (data_len as usize) > actual_len {
        return Err(format!(
            "Save state truncated: header says {} bytes, file has {}",
            data_len, actual_len
        ));
    }
    if file_base != current_base {
        log::warn!(
            "Save state DMA base mismatch: file={:#010X}, board={:#010X}, loading anyway",
            file_base,
            current_base
        );
    }
    Ok(())
}

/// Restore board state from a save state byte buffer.
/// Returns Ok(()) on success, Err(message) on failure. On failure the
/// board is left untouched.
pub fn restore(board: &mut WaviousHost, data: &[u8]) -> Result<(), String> {
    if data.len() < HEADER_SIZE {
        return Err("Save state too small for header".to_string());
    }
    if &data[0..4] != MAGIC {
        return Err("Invalid save state magic".to_string());
    }

    let mut header = StateReader::new(&data[4..HEADER_SIZE]);
    let file_version = header.read_u32().map_err(|e| e.to_string())?;
    let file_base = header.read_u64().map_err(|e| e.to_string())?;
    let data_len = header.read_u32().map_err(|e| e.to_string())?;
    let actual_data = &data[HEADER_SIZE..];

    validate_header(
        file_version,
        file_base,
        board.bus.dma.base(),
        data_len,
        actual_data.len(),
    )?;

    let mut r = StateReader::new(&actual_data[..data_len as usize]);
    let (regs, level) = read_dma(&mut r).map_err(|e| format!("Failed to read DMA state: {}", e))?;

    // Read and size-check every region before touching the board.
    let mut regions = Vec::with_capacity(SAVED_REGIONS.len());
    for name in SAVED_REGIONS {
        let len = r
            .read_u32()
            .map_err(|e| format!("Failed to read {} length: {}", name, e))? as usize;
        let bytes = r
            .read_bytes(len)
            .map_err(|e| format!("Failed to read {}: {}", name, e))?;
        let current = board.bus.mem.region(name).map_or(0, |ram| ram.len());
        if len != current {
            return Err(format!(
                "Save state {} is {:#X} bytes, board has {:#X}",
                name, len, current
            ));
        }
        regions.push((name, bytes));
    }

    for (name, bytes) in regions {
        if let Some(ram) = board.bus.mem.region_mut(name) {
            ram.data_mut().copy_from_slice(bytes);
        }
    }

    let bus = &mut board.bus;
    bus.dma.load_regs(regs, &mut bus.plic);
    if bus.dma.irq_level() != level {
        log::warn!(
            "Save state line level {} disagrees with registers, using {}",
            level,
            bus.dma.irq_level()
        );
    }
    Ok(())
}

fn read_dma(r: &mut StateReader) -> io::Result<(DmaRegs, bool)> {
    let regs = DmaRegs {
        start: r.read_u32()?,
        control: r.read_u32()?,
        src: r.read_u32()?,
        len: r.read_u32()?,
        dst: r.read_u64()?,
        settings: r.read_u32()?,
        irq_en: r.read_u32()?,
        irq_sta: r.read_u32()?,
    };
    let level = r.read_bool()?;
    Ok((regs, level))
}

/// Save state to a file.
pub fn save_to_file(board: &WaviousHost, path: &Path) -> io::Result<()> {
    let data = capture(board);
    std::fs::write(path, &data)?;
    log::info!(
        "Saved state to {:?} ({:.2} MB)",
        path,
        data.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

/// Load state from a file.
pub fn load_from_file(board: &mut WaviousHost, path: &Path) -> Result<(), String> {
    let data = std::fs::read(path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    restore(board, &data)?;
    log::info!("Loaded state from {:?}", path);
    Ok(())
}
