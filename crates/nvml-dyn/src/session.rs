//! Typed wrappers over the table's raw entry points.
//!
//! Each query zeroes its output buffers, calls through the table and turns the
//! status into a `Result`, so the C output-parameter style stays in here.

use std::ffi::{c_char, c_uint, CStr};
use std::fmt;
use std::ptr;

use crate::error::NvmlError;
use crate::ffi::*;
use crate::table::BindingTable;

/// Which running-process list to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Graphics,
    Compute,
}

impl ProcessKind {
    pub fn function_name(self) -> &'static str {
        match self {
            ProcessKind::Graphics => "nvmlDeviceGetGraphicsRunningProcesses",
            ProcessKind::Compute => "nvmlDeviceGetComputeRunningProcesses",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Graphics => write!(f, "graphics"),
            ProcessKind::Compute => write!(f, "compute"),
        }
    }
}

/// Handle to one enumerated device, valid for the session it came from.
#[derive(Debug, Clone, Copy)]
pub struct Device {
    index: u32,
    handle: NvmlDeviceT,
}

impl Device {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// An initialised NVML session; `nvmlShutdown` runs when it is dropped.
pub struct Session<'a> {
    table: &'a BindingTable,
}

impl BindingTable {
    /// Calls `nvmlInit` (or `nvmlInit_v2` when bound) and opens a session.
    pub fn session(&self) -> Result<Session<'_>, NvmlError> {
        let ret = unsafe { (self.functions().nvml_init)() };
        self.check("nvmlInit", ret)?;
        Ok(Session { table: self })
    }
}

impl Session<'_> {
    pub fn nvml_version(&self) -> Result<String, NvmlError> {
        let f = self.table.functions().nvml_system_get_nvml_version;
        self.read_string::<VERSION_BUFFER_SIZE>("nvmlSystemGetNVMLVersion", |buf, len| unsafe {
            f(buf, len)
        })
    }

    pub fn driver_version(&self) -> Result<String, NvmlError> {
        let f = self.table.functions().nvml_system_get_driver_version;
        self.read_string::<VERSION_BUFFER_SIZE>("nvmlSystemGetDriverVersion", |buf, len| unsafe {
            f(buf, len)
        })
    }

    /// Encoded as `major * 1000 + minor * 10`.
    pub fn cuda_driver_version(&self) -> Result<i32, NvmlError> {
        let mut version = 0;
        let ret = unsafe { (self.table.functions().nvml_system_get_cuda_driver_version)(&mut version) };
        self.table.check("nvmlSystemGetCudaDriverVersion", ret)?;
        Ok(version)
    }

    pub fn device_count(&self) -> Result<u32, NvmlError> {
        let mut count: c_uint = 0;
        let ret = unsafe { (self.table.functions().nvml_device_get_count)(&mut count) };
        self.table.check("nvmlDeviceGetCount", ret)?;
        Ok(count)
    }

    pub fn device_by_index(&self, index: u32) -> Result<Device, NvmlError> {
        let mut handle: NvmlDeviceT = ptr::null_mut();
        let ret =
            unsafe { (self.table.functions().nvml_device_get_handle_by_index)(index, &mut handle) };
        self.table.check("nvmlDeviceGetHandleByIndex", ret)?;
        Ok(Device { index, handle })
    }

    pub fn memory_info(&self, device: &Device) -> Result<NvmlMemoryT, NvmlError> {
        let mut memory = NvmlMemoryT::default();
        let ret =
            unsafe { (self.table.functions().nvml_device_get_memory_info)(device.handle, &mut memory) };
        self.table.check("nvmlDeviceGetMemoryInfo", ret)?;
        Ok(memory)
    }

    pub fn bar1_memory_info(&self, device: &Device) -> Result<NvmlBar1MemoryT, NvmlError> {
        let mut bar1 = NvmlBar1MemoryT::default();
        let ret = unsafe {
            (self.table.functions().nvml_device_get_bar1_memory_info)(device.handle, &mut bar1)
        };
        self.table.check("nvmlDeviceGetBAR1MemoryInfo", ret)?;
        Ok(bar1)
    }

    /// Fetches up to [`MAX_PROCESSES`] entries of the given kind.
    pub fn running_processes(
        &self,
        device: &Device,
        kind: ProcessKind,
    ) -> Result<Vec<NvmlProcessInfoT>, NvmlError> {
        let functions = self.table.functions();
        let query = match kind {
            ProcessKind::Graphics => functions.nvml_device_get_graphics_running_processes,
            ProcessKind::Compute => functions.nvml_device_get_compute_running_processes,
        };

        let mut infos = vec![NvmlProcessInfoT::default(); MAX_PROCESSES];
        let mut count = MAX_PROCESSES as c_uint;
        let ret = unsafe { query(device.handle, &mut count, infos.as_mut_ptr()) };
        self.table.check(kind.function_name(), ret)?;

        infos.truncate((count as usize).min(MAX_PROCESSES));
        Ok(infos)
    }

    pub fn process_name(&self, pid: u32) -> Result<String, NvmlError> {
        let f = self.table.functions().nvml_system_get_process_name;
        self.read_string::<PROCESS_NAME_BUFFER_SIZE>("nvmlSystemGetProcessName", |buf, len| unsafe {
            f(pid, buf, len)
        })
    }

    fn read_string<const N: usize>(
        &self,
        function: &'static str,
        call: impl FnOnce(*mut c_char, c_uint) -> NvmlReturnT,
    ) -> Result<String, NvmlError> {
        let mut buffer = [0u8; N];
        let ret = call(buffer.as_mut_ptr().cast(), N as c_uint);
        self.table.check(function, ret)?;
        Ok(buffer_to_string(&buffer))
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let ret = unsafe { (self.table.functions().nvml_shutdown)() };
        if let Err(err) = self.table.check("nvmlShutdown", ret) {
            tracing::warn!("{err}");
        }
    }
}

/// Reads a nul-terminated string, tolerating a buffer the library filled
/// completely.
fn buffer_to_string(buffer: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buffer) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buffer).into_owned(),
    }
}
