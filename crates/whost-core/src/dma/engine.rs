/// Transfer engine: the synchronous chunked copy behind START.
use super::regs::{DmaRegs, CONTROLS_MAX_BYTES_MASK};
use crate::bus::Bus;

/// Largest chunk CONTROLS can express; sizes the bounce buffer.
pub const MAX_CHUNK: usize = CONTROLS_MAX_BYTES_MASK as usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DmaError {
    #[error("chunk size is 0 with {len} bytes to move")]
    ZeroChunk { len: u64 },
}

/// How source/destination move between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkAddressing {
    /// Hardware behavior: every chunk is read from the programmed source
    /// and written to the programmed destination. Only the remaining
    /// count shrinks, so the destination ends up holding the first
    /// `min(chunk, len)` source bytes.
    #[default]
    Fixed,
    /// Both addresses advance by each chunk (a plain contiguous copy).
    Incrementing,
}

/// A transfer snapshot taken from the registers at trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub src: u64,
    pub dst: u64,
    pub len: u64,
    pub chunk: usize,
}

impl Transfer {
    pub fn from_regs(regs: &DmaRegs, base: u64) -> Self {
        Self {
            src: base.wrapping_add(regs.src as u64),
            dst: regs.dst,
            len: regs.transfer_len(),
            chunk: regs.chunk_size(),
        }
    }

    /// Run to completion. Returns the number of bytes moved (always `len`).
    pub fn run<B: Bus>(&self, addressing: ChunkAddressing, mem: &mut B) -> Result<u64, DmaError> {
        if self.chunk == 0 {
            return Err(DmaError::ZeroChunk { len: self.len });
        }

        let mut buf = [0u8; MAX_CHUNK];
        let mut src = self.src;
        let mut dst = self.dst;
        let mut remaining = self.len;

        while remaining > 0 {
            let size = remaining.min(self.chunk as u64) as usize;
            mem.read_bytes(src, &mut buf[..size]);
            mem.write_bytes(dst, &buf[..size]);
            log::trace!("DMA chunk: {:#010X} -> {:#010X}, {} bytes", src, dst, size);

            remaining -= size as u64;
            if addressing == ChunkAddressing::Incrementing {
                src = src.wrapping_add(size as u64);
                dst = dst.wrapping_add(size as u64);
            }
        }

        Ok(self.len)
    }
}
