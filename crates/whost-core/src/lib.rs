pub mod board;
pub mod bus;
pub mod dma;
pub mod intc;
pub mod memory;
pub mod savestate;

pub use board::{BoardConfig, WaviousHost};
pub use dma::{ChunkAddressing, DmaConfig, WhostDma};
