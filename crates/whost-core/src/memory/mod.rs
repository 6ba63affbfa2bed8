pub mod phys;
pub mod ram;

pub use phys::PhysMemory;
pub use ram::Ram;
