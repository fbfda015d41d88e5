//! In-process stand-in for `libnvidia-ml`, used by tests.
//!
//! [`MockLibrary`] is a [`SymbolSource`] backed by a name → address map.
//! [`MockNvml`] scripts a whole NVML: install it on the current thread and
//! its `extern "C"` entry points answer from that script.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void};
use std::ptr::{self, NonNull};

use crate::ffi::*;
use crate::library::SymbolSource;
use crate::table::BindingTable;

/// Symbol source built from explicit function addresses.
#[derive(Debug, Default, Clone)]
pub struct MockLibrary {
    symbols: HashMap<String, NonNull<c_void>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, name: &str, address: *const c_void) -> Self {
        if let Some(address) = NonNull::new(address.cast_mut()) {
            self.symbols.insert(name.to_string(), address);
        }
        self
    }

    pub fn without_symbol(mut self, name: &str) -> Self {
        self.symbols.remove(name);
        self
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Binds a fresh table against this library.
    pub fn into_table(self) -> BindingTable {
        let mut table = BindingTable::new();
        table
            .attach("mock", self)
            .expect("fresh table accepts a library");
        table
    }
}

impl SymbolSource for MockLibrary {
    fn lookup(&self, name: &str) -> Option<NonNull<c_void>> {
        self.symbols.get(name).copied()
    }
}

/// Scripted answers for one device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub handle: Result<(), NvmlReturnT>,
    pub memory: Result<NvmlMemoryT, NvmlReturnT>,
    pub bar1: Result<NvmlBar1MemoryT, NvmlReturnT>,
    pub graphics: Result<Vec<NvmlProcessInfoT>, NvmlReturnT>,
    pub compute: Result<Vec<NvmlProcessInfoT>, NvmlReturnT>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            handle: Ok(()),
            memory: Ok(NvmlMemoryT::default()),
            bar1: Ok(NvmlBar1MemoryT::default()),
            graphics: Ok(Vec::new()),
            compute: Ok(Vec::new()),
        }
    }
}

/// Scripted answers for a whole library.
#[derive(Debug, Clone)]
pub struct MockNvml {
    pub init: NvmlReturnT,
    pub nvml_version: Result<String, NvmlReturnT>,
    pub driver_version: Result<String, NvmlReturnT>,
    pub cuda_version: Result<c_int, NvmlReturnT>,
    /// When set, `nvmlDeviceGetCount` fails with this status.
    pub device_count_error: Option<NvmlReturnT>,
    pub devices: Vec<MockDevice>,
    /// Processes without an entry fail the name lookup with `NOT_FOUND`.
    pub process_names: HashMap<u32, String>,
}

impl Default for MockNvml {
    fn default() -> Self {
        Self {
            init: NVML_SUCCESS,
            nvml_version: Ok(String::new()),
            driver_version: Ok(String::new()),
            cuda_version: Ok(0),
            device_count_error: None,
            devices: Vec::new(),
            process_names: HashMap::new(),
        }
    }
}

struct MockState {
    script: MockNvml,
    sessions: usize,
    calls: HashMap<&'static str, usize>,
}

thread_local! {
    static STATE: RefCell<Option<MockState>> = const { RefCell::new(None) };
}

impl MockNvml {
    /// Makes this script the current thread's NVML and returns a library
    /// exporting every unversioned catalog symbol.
    pub fn install(self) -> MockLibrary {
        STATE.with(|state| {
            *state.borrow_mut() = Some(MockState {
                script: self,
                sessions: 0,
                calls: HashMap::new(),
            });
        });

        MockLibrary::new()
            .with_symbol("nvmlInit", mock_init as FnNvmlInit as *const c_void)
            .with_symbol("nvmlShutdown", mock_shutdown as FnNvmlShutdown as *const c_void)
            .with_symbol(
                "nvmlErrorString",
                mock_error_string as FnNvmlErrorString as *const c_void,
            )
            .with_symbol(
                "nvmlSystemGetNVMLVersion",
                mock_nvml_version as FnNvmlSystemGetString as *const c_void,
            )
            .with_symbol(
                "nvmlSystemGetDriverVersion",
                mock_driver_version as FnNvmlSystemGetString as *const c_void,
            )
            .with_symbol(
                "nvmlSystemGetCudaDriverVersion",
                mock_cuda_driver_version as FnNvmlSystemGetCudaDriverVersion as *const c_void,
            )
            .with_symbol(
                "nvmlSystemGetProcessName",
                mock_process_name as FnNvmlSystemGetProcessName as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetCount",
                mock_device_count as FnNvmlDeviceGetCount as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetHandleByIndex",
                mock_handle_by_index as FnNvmlDeviceGetHandleByIndex as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetMemoryInfo",
                mock_memory_info as FnNvmlDeviceGetMemoryInfo as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetBAR1MemoryInfo",
                mock_bar1_memory_info as FnNvmlDeviceGetBar1MemoryInfo as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetGraphicsRunningProcesses",
                mock_graphics_processes as FnNvmlDeviceGetRunningProcesses as *const c_void,
            )
            .with_symbol(
                "nvmlDeviceGetComputeRunningProcesses",
                mock_compute_processes as FnNvmlDeviceGetRunningProcesses as *const c_void,
            )
    }

    /// How often the named entry point was called since [`install`].
    ///
    /// [`install`]: MockNvml::install
    pub fn call_count(name: &str) -> usize {
        STATE.with(|state| {
            state
                .borrow()
                .as_ref()
                .and_then(|s| s.calls.get(name).copied())
                .unwrap_or(0)
        })
    }

    /// Number of sessions currently open.
    pub fn open_sessions() -> usize {
        STATE.with(|state| state.borrow().as_ref().map_or(0, |s| s.sessions))
    }
}

/// Records the call and runs `f` against the installed script.
fn with_state(
    name: &'static str,
    requires_session: bool,
    f: impl FnOnce(&mut MockState) -> NvmlReturnT,
) -> NvmlReturnT {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        let Some(state) = state.as_mut() else {
            return NVML_ERROR_LIBRARY_NOT_FOUND;
        };
        *state.calls.entry(name).or_default() += 1;
        if requires_session && state.sessions == 0 {
            return NVML_ERROR_UNINITIALIZED;
        }
        f(state)
    })
}

fn device_index(handle: NvmlDeviceT) -> Option<usize> {
    (handle as usize).checked_sub(1)
}

fn device<'a>(state: &'a MockState, handle: NvmlDeviceT) -> Option<&'a MockDevice> {
    device_index(handle).and_then(|index| state.script.devices.get(index))
}

unsafe fn write_string(bytes: &[u8], buffer: *mut c_char, length: c_uint) -> NvmlReturnT {
    if buffer.is_null() || bytes.len() + 1 > length as usize {
        return NVML_ERROR_INSUFFICIENT_SIZE;
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), bytes.len());
    *buffer.add(bytes.len()) = 0;
    NVML_SUCCESS
}

unsafe fn write_processes(
    processes: &Result<Vec<NvmlProcessInfoT>, NvmlReturnT>,
    info_count: *mut c_uint,
    infos: *mut NvmlProcessInfoT,
) -> NvmlReturnT {
    let processes = match processes {
        Ok(processes) => processes,
        Err(code) => return *code,
    };
    if info_count.is_null() {
        return NVML_ERROR_INVALID_ARGUMENT;
    }
    let capacity = *info_count as usize;
    *info_count = processes.len() as c_uint;
    if processes.len() > capacity {
        return NVML_ERROR_INSUFFICIENT_SIZE;
    }
    if !processes.is_empty() {
        ptr::copy_nonoverlapping(processes.as_ptr(), infos, processes.len());
    }
    NVML_SUCCESS
}

unsafe extern "C" fn mock_init() -> NvmlReturnT {
    with_state("nvmlInit", false, |state| {
        if state.script.init == NVML_SUCCESS {
            state.sessions += 1;
        }
        state.script.init
    })
}

unsafe extern "C" fn mock_shutdown() -> NvmlReturnT {
    with_state("nvmlShutdown", true, |state| {
        state.sessions -= 1;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn mock_error_string(result: NvmlReturnT) -> *const c_char {
    match result {
        NVML_SUCCESS => c"Success".as_ptr(),
        NVML_ERROR_UNINITIALIZED => c"Uninitialized".as_ptr(),
        NVML_ERROR_INVALID_ARGUMENT => c"Invalid Argument".as_ptr(),
        NVML_ERROR_NOT_SUPPORTED => c"Not Supported".as_ptr(),
        NVML_ERROR_NO_PERMISSION => c"Insufficient Permissions".as_ptr(),
        NVML_ERROR_NOT_FOUND => c"Not Found".as_ptr(),
        NVML_ERROR_INSUFFICIENT_SIZE => c"Insufficient Size".as_ptr(),
        NVML_ERROR_DRIVER_NOT_LOADED => c"Driver Not Loaded".as_ptr(),
        NVML_ERROR_GPU_IS_LOST => c"GPU is lost".as_ptr(),
        _ => c"Unknown Error".as_ptr(),
    }
}

unsafe extern "C" fn mock_nvml_version(buffer: *mut c_char, length: c_uint) -> NvmlReturnT {
    with_state("nvmlSystemGetNVMLVersion", true, |state| {
        match &state.script.nvml_version {
            Ok(version) => write_string(version.as_bytes(), buffer, length),
            Err(code) => *code,
        }
    })
}

unsafe extern "C" fn mock_driver_version(buffer: *mut c_char, length: c_uint) -> NvmlReturnT {
    with_state("nvmlSystemGetDriverVersion", true, |state| {
        match &state.script.driver_version {
            Ok(version) => write_string(version.as_bytes(), buffer, length),
            Err(code) => *code,
        }
    })
}

unsafe extern "C" fn mock_cuda_driver_version(version: *mut c_int) -> NvmlReturnT {
    with_state("nvmlSystemGetCudaDriverVersion", true, |state| {
        match state.script.cuda_version {
            Ok(value) => {
                *version = value;
                NVML_SUCCESS
            }
            Err(code) => code,
        }
    })
}

unsafe extern "C" fn mock_process_name(
    pid: c_uint,
    name: *mut c_char,
    length: c_uint,
) -> NvmlReturnT {
    with_state("nvmlSystemGetProcessName", true, |state| {
        match state.script.process_names.get(&pid) {
            Some(process_name) => {
                // NVML truncates instead of failing on short buffers
                let max = (length as usize).saturating_sub(1);
                let bytes = process_name.as_bytes();
                write_string(&bytes[..bytes.len().min(max)], name, length)
            }
            None => NVML_ERROR_NOT_FOUND,
        }
    })
}

unsafe extern "C" fn mock_device_count(device_count: *mut c_uint) -> NvmlReturnT {
    with_state("nvmlDeviceGetCount", true, |state| {
        if let Some(code) = state.script.device_count_error {
            return code;
        }
        *device_count = state.script.devices.len() as c_uint;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn mock_handle_by_index(index: c_uint, device: *mut NvmlDeviceT) -> NvmlReturnT {
    with_state("nvmlDeviceGetHandleByIndex", true, |state| {
        match state.script.devices.get(index as usize) {
            Some(MockDevice { handle: Ok(()), .. }) => {
                *device = (index as usize + 1) as NvmlDeviceT;
                NVML_SUCCESS
            }
            Some(MockDevice {
                handle: Err(code), ..
            }) => *code,
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}

unsafe extern "C" fn mock_memory_info(device: NvmlDeviceT, memory: *mut NvmlMemoryT) -> NvmlReturnT {
    with_state("nvmlDeviceGetMemoryInfo", true, |state| {
        match self::device(state, device).map(|d| d.memory) {
            Some(Ok(value)) => {
                *memory = value;
                NVML_SUCCESS
            }
            Some(Err(code)) => code,
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}

unsafe extern "C" fn mock_bar1_memory_info(
    device: NvmlDeviceT,
    bar1_memory: *mut NvmlBar1MemoryT,
) -> NvmlReturnT {
    with_state("nvmlDeviceGetBAR1MemoryInfo", true, |state| {
        match self::device(state, device).map(|d| d.bar1) {
            Some(Ok(value)) => {
                *bar1_memory = value;
                NVML_SUCCESS
            }
            Some(Err(code)) => code,
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}

unsafe extern "C" fn mock_graphics_processes(
    device: NvmlDeviceT,
    info_count: *mut c_uint,
    infos: *mut NvmlProcessInfoT,
) -> NvmlReturnT {
    with_state("nvmlDeviceGetGraphicsRunningProcesses", true, |state| {
        match self::device(state, device) {
            Some(d) => write_processes(&d.graphics, info_count, infos),
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}

unsafe extern "C" fn mock_compute_processes(
    device: NvmlDeviceT,
    info_count: *mut c_uint,
    infos: *mut NvmlProcessInfoT,
) -> NvmlReturnT {
    with_state("nvmlDeviceGetComputeRunningProcesses", true, |state| {
        match self::device(state, device) {
            Some(d) => write_processes(&d.compute, info_count, infos),
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}
