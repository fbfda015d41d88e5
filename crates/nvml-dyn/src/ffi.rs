//! Raw NVML ABI: status codes, output structures and entry point signatures.
//!
//! Only the subset of `nvml.h` needed by the symbol catalog is mirrored here.

use std::ffi::{c_char, c_int, c_uint, c_ulonglong, c_void};

pub type NvmlReturnT = c_uint;

/// Opaque device handle (`nvmlDevice_t`).
pub type NvmlDeviceT = *mut c_void;

pub const NVML_SUCCESS: NvmlReturnT = 0;
pub const NVML_ERROR_UNINITIALIZED: NvmlReturnT = 1;
pub const NVML_ERROR_INVALID_ARGUMENT: NvmlReturnT = 2;
pub const NVML_ERROR_NOT_SUPPORTED: NvmlReturnT = 3;
pub const NVML_ERROR_NO_PERMISSION: NvmlReturnT = 4;
pub const NVML_ERROR_ALREADY_INITIALIZED: NvmlReturnT = 5;
pub const NVML_ERROR_NOT_FOUND: NvmlReturnT = 6;
pub const NVML_ERROR_INSUFFICIENT_SIZE: NvmlReturnT = 7;
pub const NVML_ERROR_INSUFFICIENT_POWER: NvmlReturnT = 8;
pub const NVML_ERROR_DRIVER_NOT_LOADED: NvmlReturnT = 9;
pub const NVML_ERROR_TIMEOUT: NvmlReturnT = 10;
pub const NVML_ERROR_IRQ_ISSUE: NvmlReturnT = 11;
pub const NVML_ERROR_LIBRARY_NOT_FOUND: NvmlReturnT = 12;
pub const NVML_ERROR_FUNCTION_NOT_FOUND: NvmlReturnT = 13;
pub const NVML_ERROR_CORRUPTED_INFOROM: NvmlReturnT = 14;
pub const NVML_ERROR_GPU_IS_LOST: NvmlReturnT = 15;
pub const NVML_ERROR_RESET_REQUIRED: NvmlReturnT = 16;
pub const NVML_ERROR_OPERATING_SYSTEM: NvmlReturnT = 17;
pub const NVML_ERROR_LIB_RM_VERSION_MISMATCH: NvmlReturnT = 18;
pub const NVML_ERROR_IN_USE: NvmlReturnT = 19;
pub const NVML_ERROR_MEMORY: NvmlReturnT = 20;
pub const NVML_ERROR_NO_DATA: NvmlReturnT = 21;
pub const NVML_ERROR_UNKNOWN: NvmlReturnT = 999;

/// Buffer size used for version strings; larger than NVML's own 80 byte limit.
pub const VERSION_BUFFER_SIZE: usize = 256;
/// Buffer size used for `nvmlSystemGetProcessName`.
pub const PROCESS_NAME_BUFFER_SIZE: usize = 80;
/// Upper bound of processes fetched per running-process query.
pub const MAX_PROCESSES: usize = 256;

// NVML Memory Info structure
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NvmlMemoryT {
    pub total: c_ulonglong,
    pub free: c_ulonglong,
    pub used: c_ulonglong,
}

// NVML BAR1 Memory Info structure
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NvmlBar1MemoryT {
    pub bar1_total: c_ulonglong,
    pub bar1_free: c_ulonglong,
    pub bar1_used: c_ulonglong,
}

/// `nvmlProcessInfo_v1_t`, the layout expected by the unversioned
/// running-process entry points.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NvmlProcessInfoT {
    pub pid: c_uint,
    pub used_gpu_memory: c_ulonglong,
}

pub type FnNvmlInit = unsafe extern "C" fn() -> NvmlReturnT;
pub type FnNvmlShutdown = unsafe extern "C" fn() -> NvmlReturnT;
pub type FnNvmlErrorString = unsafe extern "C" fn(result: NvmlReturnT) -> *const c_char;
pub type FnNvmlSystemGetString =
    unsafe extern "C" fn(buffer: *mut c_char, length: c_uint) -> NvmlReturnT;
pub type FnNvmlSystemGetCudaDriverVersion =
    unsafe extern "C" fn(cuda_driver_version: *mut c_int) -> NvmlReturnT;
pub type FnNvmlSystemGetProcessName =
    unsafe extern "C" fn(pid: c_uint, name: *mut c_char, length: c_uint) -> NvmlReturnT;
pub type FnNvmlDeviceGetCount = unsafe extern "C" fn(device_count: *mut c_uint) -> NvmlReturnT;
pub type FnNvmlDeviceGetHandleByIndex =
    unsafe extern "C" fn(index: c_uint, device: *mut NvmlDeviceT) -> NvmlReturnT;
pub type FnNvmlDeviceGetMemoryInfo =
    unsafe extern "C" fn(device: NvmlDeviceT, memory: *mut NvmlMemoryT) -> NvmlReturnT;
pub type FnNvmlDeviceGetBar1MemoryInfo =
    unsafe extern "C" fn(device: NvmlDeviceT, bar1_memory: *mut NvmlBar1MemoryT) -> NvmlReturnT;
pub type FnNvmlDeviceGetRunningProcesses = unsafe extern "C" fn(
    device: NvmlDeviceT,
    info_count: *mut c_uint,
    infos: *mut NvmlProcessInfoT,
) -> NvmlReturnT;

/// Name of a status code as spelled in `nvml.h`, used when
/// `nvmlErrorString` itself is unavailable.
pub fn return_code_name(code: NvmlReturnT) -> &'static str {
    match code {
        NVML_SUCCESS => "Success",
        NVML_ERROR_UNINITIALIZED => "Uninitialized",
        NVML_ERROR_INVALID_ARGUMENT => "Invalid Argument",
        NVML_ERROR_NOT_SUPPORTED => "Not Supported",
        NVML_ERROR_NO_PERMISSION => "Insufficient Permissions",
        NVML_ERROR_ALREADY_INITIALIZED => "Already Initialized",
        NVML_ERROR_NOT_FOUND => "Not Found",
        NVML_ERROR_INSUFFICIENT_SIZE => "Insufficient Size",
        NVML_ERROR_INSUFFICIENT_POWER => "Insufficient External Power",
        NVML_ERROR_DRIVER_NOT_LOADED => "Driver Not Loaded",
        NVML_ERROR_TIMEOUT => "Timeout",
        NVML_ERROR_IRQ_ISSUE => "Interrupt Request Issue",
        NVML_ERROR_LIBRARY_NOT_FOUND => "NVML Shared Library Not Found",
        NVML_ERROR_FUNCTION_NOT_FOUND => "Function Not Found",
        NVML_ERROR_CORRUPTED_INFOROM => "Corrupted infoROM",
        NVML_ERROR_GPU_IS_LOST => "GPU is lost",
        NVML_ERROR_RESET_REQUIRED => "GPU requires restart",
        NVML_ERROR_OPERATING_SYSTEM => "The operating system has blocked the request",
        NVML_ERROR_LIB_RM_VERSION_MISMATCH => "RM has detected an NVML/RM version mismatch",
        NVML_ERROR_IN_USE => "In use by another client",
        NVML_ERROR_MEMORY => "Insufficient Memory",
        NVML_ERROR_NO_DATA => "No data",
        _ => "Unknown Error",
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn struct_layouts_match_nvml_header() {
        assert_eq!(size_of::<NvmlMemoryT>(), 24);
        assert_eq!(size_of::<NvmlBar1MemoryT>(), 24);
        // pid is padded to the 8 byte alignment of usedGpuMemory
        assert_eq!(size_of::<NvmlProcessInfoT>(), 16);
    }

    #[test]
    fn unknown_codes_have_a_name() {
        assert_eq!(return_code_name(NVML_ERROR_NOT_SUPPORTED), "Not Supported");
        assert_eq!(return_code_name(12345), "Unknown Error");
    }
}
