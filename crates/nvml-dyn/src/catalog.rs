//! Declarative list of every NVML entry point the table binds.
//!
//! Each [`CatalogEntry`] names a symbol, the optional `_v2` variant that
//! supersedes it, and the fallback installed when the library lacks both.
//! [`Catalog::resolve`] is the only place that turns raw symbol addresses
//! into typed function pointers.

use std::ffi::c_void;
use std::mem::{size_of, transmute_copy};
use std::ptr::NonNull;

use crate::fallback;
use crate::ffi::*;
use crate::library::SymbolSource;

/// One bindable entry point, typed by its C signature `F`.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry<F> {
    pub name: &'static str,
    pub versioned: Option<&'static str>,
    fallback: F,
}

impl<F: Copy> CatalogEntry<F> {
    const fn new(name: &'static str, fallback: F) -> Self {
        Self {
            name,
            versioned: None,
            fallback,
        }
    }

    const fn with_versioned(name: &'static str, versioned: &'static str, fallback: F) -> Self {
        Self {
            name,
            versioned: Some(versioned),
            fallback,
        }
    }

    /// Looks up the base symbol, falls back to the no-op when it is absent,
    /// then lets a resolved versioned variant replace whatever was chosen.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the ABI of
    /// both `name` and `versioned` in `source`.
    unsafe fn resolve(&self, source: &dyn SymbolSource, report: &mut ResolveReport) -> F {
        let mut resolved = match source.lookup(self.name) {
            Some(ptr) => {
                report.resolved.push(self.name);
                cast_symbol(ptr)
            }
            None => {
                report.missing.push(self.name);
                self.fallback
            }
        };

        if let Some(versioned) = self.versioned {
            if let Some(ptr) = source.lookup(versioned) {
                tracing::debug!("{} resolves to {}", self.name, versioned);
                report.upgraded.push((self.name, versioned));
                report.missing.retain(|name| *name != self.name);
                resolved = cast_symbol(ptr);
            }
        }

        resolved
    }
}

unsafe fn cast_symbol<F: Copy>(ptr: NonNull<c_void>) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    transmute_copy::<*mut c_void, F>(&ptr.as_ptr())
}

/// Which catalog names bound to real code, which fell back, and which were
/// redirected to a versioned variant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    pub resolved: Vec<&'static str>,
    pub upgraded: Vec<(&'static str, &'static str)>,
    pub missing: Vec<&'static str>,
}

impl ResolveReport {
    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.contains(&name) || self.upgraded.iter().any(|(base, _)| *base == name)
    }

    /// The symbol a logical name is actually bound to, if any.
    pub fn bound_symbol(&self, name: &str) -> Option<&'static str> {
        if let Some((_, versioned)) = self.upgraded.iter().find(|(base, _)| *base == name) {
            return Some(versioned);
        }
        self.resolved.iter().find(|n| **n == name).copied()
    }
}

/// Resolved NVML entry points. Every field is always safe to call: it is
/// either the library's function or a fallback returning
/// `NVML_ERROR_NOT_SUPPORTED`.
#[derive(Clone, Copy)]
pub struct NvmlFunctions {
    pub nvml_init: FnNvmlInit,
    pub nvml_shutdown: FnNvmlShutdown,
    pub nvml_error_string: FnNvmlErrorString,
    pub nvml_system_get_nvml_version: FnNvmlSystemGetString,
    pub nvml_system_get_driver_version: FnNvmlSystemGetString,
    pub nvml_system_get_cuda_driver_version: FnNvmlSystemGetCudaDriverVersion,
    pub nvml_system_get_process_name: FnNvmlSystemGetProcessName,
    pub nvml_device_get_count: FnNvmlDeviceGetCount,
    pub nvml_device_get_handle_by_index: FnNvmlDeviceGetHandleByIndex,
    pub nvml_device_get_memory_info: FnNvmlDeviceGetMemoryInfo,
    pub nvml_device_get_bar1_memory_info: FnNvmlDeviceGetBar1MemoryInfo,
    pub nvml_device_get_graphics_running_processes: FnNvmlDeviceGetRunningProcesses,
    pub nvml_device_get_compute_running_processes: FnNvmlDeviceGetRunningProcesses,
}

impl NvmlFunctions {
    /// A table made only of fallbacks.
    pub fn fallbacks() -> Self {
        let c = &CATALOG;
        Self {
            nvml_init: c.nvml_init.fallback,
            nvml_shutdown: c.nvml_shutdown.fallback,
            nvml_error_string: c.nvml_error_string.fallback,
            nvml_system_get_nvml_version: c.nvml_system_get_nvml_version.fallback,
            nvml_system_get_driver_version: c.nvml_system_get_driver_version.fallback,
            nvml_system_get_cuda_driver_version: c.nvml_system_get_cuda_driver_version.fallback,
            nvml_system_get_process_name: c.nvml_system_get_process_name.fallback,
            nvml_device_get_count: c.nvml_device_get_count.fallback,
            nvml_device_get_handle_by_index: c.nvml_device_get_handle_by_index.fallback,
            nvml_device_get_memory_info: c.nvml_device_get_memory_info.fallback,
            nvml_device_get_bar1_memory_info: c.nvml_device_get_bar1_memory_info.fallback,
            nvml_device_get_graphics_running_processes: c
                .nvml_device_get_graphics_running_processes
                .fallback,
            nvml_device_get_compute_running_processes: c
                .nvml_device_get_compute_running_processes
                .fallback,
        }
    }
}

/// The full set of entry points, in declaration order.
pub struct Catalog {
    pub nvml_init: CatalogEntry<FnNvmlInit>,
    pub nvml_shutdown: CatalogEntry<FnNvmlShutdown>,
    pub nvml_error_string: CatalogEntry<FnNvmlErrorString>,
    pub nvml_system_get_nvml_version: CatalogEntry<FnNvmlSystemGetString>,
    pub nvml_system_get_driver_version: CatalogEntry<FnNvmlSystemGetString>,
    pub nvml_system_get_cuda_driver_version: CatalogEntry<FnNvmlSystemGetCudaDriverVersion>,
    pub nvml_system_get_process_name: CatalogEntry<FnNvmlSystemGetProcessName>,
    pub nvml_device_get_count: CatalogEntry<FnNvmlDeviceGetCount>,
    pub nvml_device_get_handle_by_index: CatalogEntry<FnNvmlDeviceGetHandleByIndex>,
    pub nvml_device_get_memory_info: CatalogEntry<FnNvmlDeviceGetMemoryInfo>,
    pub nvml_device_get_bar1_memory_info: CatalogEntry<FnNvmlDeviceGetBar1MemoryInfo>,
    pub nvml_device_get_graphics_running_processes: CatalogEntry<FnNvmlDeviceGetRunningProcesses>,
    pub nvml_device_get_compute_running_processes: CatalogEntry<FnNvmlDeviceGetRunningProcesses>,
}

pub static CATALOG: Catalog = Catalog {
    nvml_init: CatalogEntry::with_versioned("nvmlInit", "nvmlInit_v2", fallback::init),
    nvml_shutdown: CatalogEntry::new("nvmlShutdown", fallback::shutdown),
    nvml_error_string: CatalogEntry::new("nvmlErrorString", fallback::error_string),
    nvml_system_get_nvml_version: CatalogEntry::new(
        "nvmlSystemGetNVMLVersion",
        fallback::system_get_string,
    ),
    nvml_system_get_driver_version: CatalogEntry::new(
        "nvmlSystemGetDriverVersion",
        fallback::system_get_string,
    ),
    nvml_system_get_cuda_driver_version: CatalogEntry::with_versioned(
        "nvmlSystemGetCudaDriverVersion",
        "nvmlSystemGetCudaDriverVersion_v2",
        fallback::system_get_cuda_driver_version,
    ),
    nvml_system_get_process_name: CatalogEntry::new(
        "nvmlSystemGetProcessName",
        fallback::system_get_process_name,
    ),
    nvml_device_get_count: CatalogEntry::with_versioned(
        "nvmlDeviceGetCount",
        "nvmlDeviceGetCount_v2",
        fallback::device_get_count,
    ),
    nvml_device_get_handle_by_index: CatalogEntry::with_versioned(
        "nvmlDeviceGetHandleByIndex",
        "nvmlDeviceGetHandleByIndex_v2",
        fallback::device_get_handle_by_index,
    ),
    nvml_device_get_memory_info: CatalogEntry::new(
        "nvmlDeviceGetMemoryInfo",
        fallback::device_get_memory_info,
    ),
    nvml_device_get_bar1_memory_info: CatalogEntry::new(
        "nvmlDeviceGetBAR1MemoryInfo",
        fallback::device_get_bar1_memory_info,
    ),
    nvml_device_get_graphics_running_processes: CatalogEntry::new(
        "nvmlDeviceGetGraphicsRunningProcesses",
        fallback::device_get_running_processes,
    ),
    nvml_device_get_compute_running_processes: CatalogEntry::new(
        "nvmlDeviceGetComputeRunningProcesses",
        fallback::device_get_running_processes,
    ),
};

impl Catalog {
    /// Logical names of all entries, in declaration order.
    pub fn names(&self) -> [&'static str; 13] {
        [
            self.nvml_init.name,
            self.nvml_shutdown.name,
            self.nvml_error_string.name,
            self.nvml_system_get_nvml_version.name,
            self.nvml_system_get_driver_version.name,
            self.nvml_system_get_cuda_driver_version.name,
            self.nvml_system_get_process_name.name,
            self.nvml_device_get_count.name,
            self.nvml_device_get_handle_by_index.name,
            self.nvml_device_get_memory_info.name,
            self.nvml_device_get_bar1_memory_info.name,
            self.nvml_device_get_graphics_running_processes.name,
            self.nvml_device_get_compute_running_processes.name,
        ]
    }

    /// Binds every entry against `source`.
    pub fn resolve(&self, source: &dyn SymbolSource) -> (NvmlFunctions, ResolveReport) {
        let mut report = ResolveReport::default();
        let r = &mut report;
        // SAFETY: each entry's type parameter is the signature declared for
        // that symbol in nvml.h, including its `_v2` variant.
        let functions = unsafe {
            NvmlFunctions {
                nvml_init: self.nvml_init.resolve(source, r),
                nvml_shutdown: self.nvml_shutdown.resolve(source, r),
                nvml_error_string: self.nvml_error_string.resolve(source, r),
                nvml_system_get_nvml_version: self.nvml_system_get_nvml_version.resolve(source, r),
                nvml_system_get_driver_version: self
                    .nvml_system_get_driver_version
                    .resolve(source, r),
                nvml_system_get_cuda_driver_version: self
                    .nvml_system_get_cuda_driver_version
                    .resolve(source, r),
                nvml_system_get_process_name: self.nvml_system_get_process_name.resolve(source, r),
                nvml_device_get_count: self.nvml_device_get_count.resolve(source, r),
                nvml_device_get_handle_by_index: self
                    .nvml_device_get_handle_by_index
                    .resolve(source, r),
                nvml_device_get_memory_info: self.nvml_device_get_memory_info.resolve(source, r),
                nvml_device_get_bar1_memory_info: self
                    .nvml_device_get_bar1_memory_info
                    .resolve(source, r),
                nvml_device_get_graphics_running_processes: self
                    .nvml_device_get_graphics_running_processes
                    .resolve(source, r),
                nvml_device_get_compute_running_processes: self
                    .nvml_device_get_compute_running_processes
                    .resolve(source, r),
            }
        };
        (functions, report)
    }
}
