mod container;
mod quantity;

pub use container::{ContainerTunables, CpuTunables, MemoryTunables};
pub use quantity::{parse_cpu_millicores, parse_memory_bytes};
