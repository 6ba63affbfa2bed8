pub mod map;

/// Physical memory bus trait. DMA masters read and write through this.
///
/// Addresses are 64-bit physical addresses; there is no translation
/// between the device and memory. Accesses always succeed: unbacked
/// bytes read as zero and stray writes are dropped by the implementor.
pub trait Bus {
    /// Fill `buf` with the bytes starting at `addr`.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]);

    /// Store `data` starting at `addr`.
    fn write_bytes(&mut self, addr: u64, data: &[u8]);
}

/// Consumer of interrupt lines (an interrupt controller input bank).
pub trait InterruptSink {
    /// Drive interrupt source `id` to `level` (true = asserted).
    fn set_line(&mut self, id: u32, level: bool);
}
