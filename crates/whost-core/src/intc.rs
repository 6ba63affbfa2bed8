/// Interrupt aggregator (PLIC input side).
///
/// Collects level-triggered lines from the board's devices. Only the
/// line levels are modeled: priorities, claim/complete and per-hart
/// contexts belong to the interrupt controller proper.
use crate::bus::InterruptSink;

/// Number of interrupt sources on the Wavious Host PLIC (source 0 is
/// reserved and never driven).
pub const NUM_SOURCES: u32 = 65;

/// Interrupt source numbers as wired on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IrqSource {
    Dma = 1,
    Uart = 64,
}

pub struct Plic {
    /// Bit N set = source N currently asserted.
    levels: u128,
    /// Count of low→high transitions per source, for diagnostics.
    pub raise_count: [u32; NUM_SOURCES as usize],
}

impl Plic {
    pub fn new() -> Self {
        Self {
            levels: 0,
            raise_count: [0; NUM_SOURCES as usize],
        }
    }

    pub fn is_asserted(&self, id: u32) -> bool {
        id < NUM_SOURCES && self.levels & (1u128 << id) != 0
    }

    /// Bitmask of asserted sources.
    pub fn pending(&self) -> u128 {
        self.levels
    }

    pub fn any_asserted(&self) -> bool {
        self.levels != 0
    }

    pub fn reset(&mut self) {
        self.levels = 0;
        self.raise_count = [0; NUM_SOURCES as usize];
    }
}

impl Default for Plic {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptSink for Plic {
    fn set_line(&mut self, id: u32, level: bool) {
        if id == 0 || id >= NUM_SOURCES {
            log::warn!("PLIC: ignoring line {} (valid sources 1..{})", id, NUM_SOURCES);
            return;
        }
        let bit = 1u128 << id;
        let was = self.levels & bit != 0;
        if level {
            self.levels |= bit;
            if !was {
                self.raise_count[id as usize] += 1;
                log::trace!("PLIC: source {} raised", id);
            }
        } else {
            self.levels &= !bit;
            if was {
                log::trace!("PLIC: source {} lowered", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_track_level_and_count_edges() {
        let mut plic = Plic::new();
        let dma = IrqSource::Dma as u32;

        plic.set_line(dma, true);
        plic.set_line(dma, true);
        assert!(plic.is_asserted(dma));
        assert_eq!(plic.pending(), 1 << dma);
        assert_eq!(plic.raise_count[dma as usize], 1);

        plic.set_line(dma, false);
        assert!(!plic.any_asserted());

        plic.set_line(dma, true);
        assert_eq!(plic.raise_count[dma as usize], 2);
    }

    #[test]
    fn out_of_range_sources_are_ignored() {
        let mut plic = Plic::new();
        plic.set_line(0, true);
        plic.set_line(NUM_SOURCES, true);
        assert!(!plic.any_asserted());
        assert!(!plic.is_asserted(NUM_SOURCES + 10));

        plic.set_line(IrqSource::Uart as u32, true);
        assert!(plic.is_asserted(64));
    }
}
