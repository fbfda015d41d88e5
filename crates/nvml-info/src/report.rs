//! Report model produced by one collection pass.

use std::fmt;

use nvml_dyn::ffi::{NvmlBar1MemoryT, NvmlMemoryT};
use serde::Serialize;

/// `usedGpuMemory` value NVML reports when it cannot attribute memory,
/// e.g. under Windows WDDM.
pub const NVML_VALUE_NOT_AVAILABLE: u64 = u64::MAX;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Empty when the name lookup failed.
    pub name: String,
    pub used_gpu_memory: u64,
}

impl ProcessInfo {
    pub fn used_memory(&self) -> Option<u64> {
        (self.used_gpu_memory != NVML_VALUE_NOT_AVAILABLE).then_some(self.used_gpu_memory)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

impl From<NvmlMemoryT> for MemoryInfo {
    fn from(memory: NvmlMemoryT) -> Self {
        Self {
            total: memory.total,
            free: memory.free,
            used: memory.used,
        }
    }
}

impl From<NvmlBar1MemoryT> for MemoryInfo {
    fn from(memory: NvmlBar1MemoryT) -> Self {
        Self {
            total: memory.bar1_total,
            free: memory.bar1_free,
            used: memory.bar1_used,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub bar1_memory: MemoryInfo,
    pub memory: MemoryInfo,
    pub graphics_processes: Vec<ProcessInfo>,
    pub compute_processes: Vec<ProcessInfo>,
}

/// CUDA driver version decoded from NVML's `major * 1000 + minor * 10`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CudaVersion {
    pub major: i32,
    pub minor: i32,
}

impl From<i32> for CudaVersion {
    fn from(encoded: i32) -> Self {
        Self {
            major: encoded / 1000,
            minor: (encoded % 1000) / 10,
        }
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Everything one pass learned. Fields a query could not fill stay
/// empty or zero.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub driver_version: String,
    pub nvml_version: String,
    pub cuda_version: i32,
    pub devices: Vec<DeviceInfo>,
}

impl SystemInfo {
    pub fn cuda(&self) -> CudaVersion {
        CudaVersion::from(self.cuda_version)
    }
}

fn write_processes(f: &mut fmt::Formatter<'_>, title: &str, processes: &[ProcessInfo]) -> fmt::Result {
    if processes.is_empty() {
        return Ok(());
    }

    writeln!(f, "  {title}:")?;
    for process in processes {
        match process.used_memory() {
            Some(used) => write!(f, "    {:8.2}MB", mb(used))?,
            None => write!(f, "    {:>8}  ", "N/A")?,
        }
        writeln!(f, " {} ({})", process.name, process.pid)?;
    }
    Ok(())
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver Version: {}", self.driver_version)?;
        writeln!(f, "NVML Version: {}", self.nvml_version)?;
        writeln!(f, "Cuda Version: {}", self.cuda())?;

        for (index, device) in self.devices.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Device #{index}:")?;
            writeln!(
                f,
                "  Bar1: {:.2}MB used of {:.2}MB",
                mb(device.bar1_memory.used),
                mb(device.bar1_memory.total)
            )?;
            writeln!(
                f,
                "  Gpu:  {:.2}MB used of {:.2}MB",
                mb(device.memory.used),
                mb(device.memory.total)
            )?;
            write_processes(f, "Gpu Processes", &device.graphics_processes)?;
            write_processes(f, "Compute Processes", &device.compute_processes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn cuda_version_is_decoded() {
        assert_eq!(CudaVersion::from(12_040), CudaVersion { major: 12, minor: 4 });
        assert_eq!(CudaVersion::from(11_080).to_string(), "11.8");
        assert_eq!(CudaVersion::from(0).to_string(), "0.0");
    }

    #[test]
    fn empty_report_prints_headers_only() {
        let info = SystemInfo::default();
        assert_eq!(
            info.to_string(),
            "Driver Version: \nNVML Version: \nCuda Version: 0.0\n"
        );
    }

    #[test]
    fn devices_and_processes_are_listed() {
        use similar_asserts::assert_eq;

        let info = SystemInfo {
            driver_version: "535.104.05".into(),
            nvml_version: "12.535.104.05".into(),
            cuda_version: 12_020,
            devices: vec![DeviceInfo {
                bar1_memory: MemoryInfo {
                    total: 256 * MB,
                    free: 254 * MB,
                    used: 2 * MB,
                },
                memory: MemoryInfo {
                    total: 8192 * MB,
                    free: 7168 * MB,
                    used: 1024 * MB,
                },
                graphics_processes: vec![ProcessInfo {
                    pid: 1234,
                    name: "/usr/bin/Xorg".into(),
                    used_gpu_memory: 512 * MB,
                }],
                compute_processes: vec![ProcessInfo {
                    pid: 99,
                    name: String::new(),
                    used_gpu_memory: NVML_VALUE_NOT_AVAILABLE,
                }],
            }],
        };

        let expected = "\
Driver Version: 535.104.05
NVML Version: 12.535.104.05
Cuda Version: 12.2

Device #0:
  Bar1: 2.00MB used of 256.00MB
  Gpu:  1024.00MB used of 8192.00MB
  Gpu Processes:
      512.00MB /usr/bin/Xorg (1234)
  Compute Processes:
         N/A    (99)
";
        let rendered = info.to_string();
        assert_eq!(rendered.as_str(), expected);
    }

    #[test]
    fn report_serializes_to_json() {
        let info = SystemInfo {
            driver_version: "550.54.14".into(),
            devices: vec![DeviceInfo::default()],
            ..SystemInfo::default()
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["driver_version"], "550.54.14");
        assert_eq!(value["devices"][0]["memory"]["total"], 0);
        assert!(value["devices"][0]["graphics_processes"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}
