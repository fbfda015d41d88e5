pub mod config;
pub mod output;
pub mod report;
pub mod walker;

pub use report::{CudaVersion, DeviceInfo, MemoryInfo, ProcessInfo, SystemInfo};
pub use walker::{collect, CollectStatus, Collection};
