//! Stand-ins installed for entry points missing from the loaded library.
//!
//! Every fallback returns `NVML_ERROR_NOT_SUPPORTED` and leaves its output
//! parameters untouched.

use std::ffi::{c_char, c_int, c_uint};

use crate::ffi::{
    NvmlBar1MemoryT, NvmlDeviceT, NvmlMemoryT, NvmlProcessInfoT, NvmlReturnT,
    NVML_ERROR_NOT_SUPPORTED,
};

pub(crate) unsafe extern "C" fn init() -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn shutdown() -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn error_string(_result: NvmlReturnT) -> *const c_char {
    c"nvmlErrorString not available".as_ptr()
}

pub(crate) unsafe extern "C" fn system_get_string(
    _buffer: *mut c_char,
    _length: c_uint,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn system_get_cuda_driver_version(
    _cuda_driver_version: *mut c_int,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn system_get_process_name(
    _pid: c_uint,
    _name: *mut c_char,
    _length: c_uint,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn device_get_count(_device_count: *mut c_uint) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn device_get_handle_by_index(
    _index: c_uint,
    _device: *mut NvmlDeviceT,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn device_get_memory_info(
    _device: NvmlDeviceT,
    _memory: *mut NvmlMemoryT,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn device_get_bar1_memory_info(
    _device: NvmlDeviceT,
    _bar1_memory: *mut NvmlBar1MemoryT,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}

pub(crate) unsafe extern "C" fn device_get_running_processes(
    _device: NvmlDeviceT,
    _info_count: *mut c_uint,
    _infos: *mut NvmlProcessInfoT,
) -> NvmlReturnT {
    NVML_ERROR_NOT_SUPPORTED
}
