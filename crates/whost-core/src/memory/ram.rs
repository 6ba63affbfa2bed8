/// A flat byte-addressable memory region (RAM or ROM).
///
/// Addresses passed in are offsets from the start of the region.
/// Multi-byte values are little-endian, like the rest of the board.
pub struct Ram {
    name: &'static str,
    data: Vec<u8>,
    read_only: bool,
}

impl Ram {
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            data: vec![0u8; size],
            read_only: false,
        }
    }

    /// A region the bus can read but not write. Contents are placed
    /// with [`Ram::load`].
    pub fn rom(name: &'static str, size: usize) -> Self {
        Self {
            read_only: true,
            ..Self::new(name, size)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `bytes` in at `offset`, bypassing the read-only flag.
    /// Returns false (and copies nothing) if the blob doesn't fit.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    pub fn write_u32(&mut self, offset: usize, val: u32) {
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }
}
