use std::ffi::{CStr, OsStr};

use crate::catalog::{NvmlFunctions, ResolveReport, CATALOG};
use crate::error::{BindingError, NvmlError};
use crate::ffi::{return_code_name, NvmlReturnT, NVML_SUCCESS};
use crate::library::{self, SymbolSource};

struct LoadedLibrary {
    name: String,
    source: Box<dyn SymbolSource>,
}

/// NVML entry points bound at runtime.
///
/// Holds the loaded library exclusively. Every entry in [`functions`] stays
/// callable for the table's whole life: missing symbols, an unloaded table
/// and a shut down table all answer `NVML_ERROR_NOT_SUPPORTED`.
///
/// [`functions`]: BindingTable::functions
pub struct BindingTable {
    library: Option<LoadedLibrary>,
    functions: NvmlFunctions,
    report: ResolveReport,
}

impl BindingTable {
    /// A table with nothing loaded; every entry is a fallback.
    pub fn new() -> Self {
        Self {
            library: None,
            functions: NvmlFunctions::fallbacks(),
            report: ResolveReport::default(),
        }
    }

    /// Loads NVML from the default candidate names and binds the catalog.
    pub fn load(explicit: Option<&OsStr>) -> Result<Self, BindingError> {
        let mut table = Self::new();
        table.initialize(explicit)?;
        Ok(table)
    }

    /// Loads NVML into an empty table.
    ///
    /// Fails with [`BindingError::AlreadyLoaded`] if a library is held; the
    /// held library is kept as is.
    pub fn initialize(&mut self, explicit: Option<&OsStr>) -> Result<(), BindingError> {
        self.ensure_unloaded()?;
        let (lib, name) = library::open_nvml(explicit)?;
        self.attach(name, lib)
    }

    /// Binds the catalog against an arbitrary symbol source and takes
    /// ownership of it.
    pub fn attach<S>(&mut self, name: impl Into<String>, source: S) -> Result<(), BindingError>
    where
        S: SymbolSource + 'static,
    {
        self.ensure_unloaded()?;

        let name = name.into();
        let (functions, report) = CATALOG.resolve(&source);

        tracing::debug!(
            library = %name,
            resolved = report.resolved.len(),
            upgraded = ?report.upgraded,
            missing = ?report.missing,
            "NVML symbols bound"
        );

        self.functions = functions;
        self.report = report;
        self.library = Some(LoadedLibrary {
            name,
            source: Box::new(source),
        });
        Ok(())
    }

    fn ensure_unloaded(&self) -> Result<(), BindingError> {
        match &self.library {
            Some(lib) => Err(BindingError::AlreadyLoaded(lib.name.clone())),
            None => Ok(()),
        }
    }

    /// Unloads the library if one is held. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(lib) = self.library.take() else {
            return;
        };

        // Drop the pointers before the code they point into goes away.
        self.functions = NvmlFunctions::fallbacks();
        self.report = ResolveReport::default();

        tracing::debug!("Unloading NVML library {}", lib.name);
        drop(lib.source);
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    pub fn library_name(&self) -> Option<&str> {
        self.library.as_ref().map(|lib| lib.name.as_str())
    }

    pub fn functions(&self) -> &NvmlFunctions {
        &self.functions
    }

    pub fn report(&self) -> &ResolveReport {
        &self.report
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.report.is_resolved(name)
    }

    /// Describes a status code through `nvmlErrorString`, or by the code's
    /// built-in name when the library does not export it.
    pub fn error_string(&self, code: NvmlReturnT) -> String {
        if !self.report.is_resolved("nvmlErrorString") {
            return return_code_name(code).to_string();
        }

        // SAFETY: nvmlErrorString takes any value and returns either null or a
        // pointer to a static nul-terminated string.
        let ptr = unsafe { (self.functions.nvml_error_string)(code) };
        if ptr.is_null() {
            return return_code_name(code).to_string();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    /// Maps a raw status to `Ok` or a described [`NvmlError`].
    pub fn check(&self, function: &'static str, code: NvmlReturnT) -> Result<(), NvmlError> {
        if code == NVML_SUCCESS {
            return Ok(());
        }
        Err(NvmlError {
            function,
            code,
            message: self.error_string(code),
        })
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingTable {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::ffi::{c_int, c_uint, c_void};
    use std::ptr;
    use std::rc::Rc;

    use super::*;
    use crate::ffi::*;
    use crate::mock::MockLibrary;

    thread_local! {
        static LAST_INIT: Cell<&'static str> = const { Cell::new("") };
    }

    unsafe extern "C" fn legacy_init() -> NvmlReturnT {
        LAST_INIT.with(|last| last.set("nvmlInit"));
        NVML_SUCCESS
    }

    unsafe extern "C" fn init_v2() -> NvmlReturnT {
        LAST_INIT.with(|last| last.set("nvmlInit_v2"));
        NVML_SUCCESS
    }

    unsafe extern "C" fn cuda_version_legacy(version: *mut c_int) -> NvmlReturnT {
        *version = 10_010;
        NVML_SUCCESS
    }

    unsafe extern "C" fn cuda_version_v2(version: *mut c_int) -> NvmlReturnT {
        *version = 12_040;
        NVML_SUCCESS
    }

    unsafe extern "C" fn error_string_null(_code: NvmlReturnT) -> *const std::ffi::c_char {
        ptr::null()
    }

    fn last_init() -> &'static str {
        LAST_INIT.with(|last| last.get())
    }

    fn table_with(source: MockLibrary) -> BindingTable {
        let mut table = BindingTable::new();
        table.attach("mock", source).expect("attach mock");
        table
    }

    #[test_log::test]
    fn missing_symbols_answer_not_supported_without_touching_outputs() {
        let table = table_with(MockLibrary::new());
        let f = table.functions();

        unsafe {
            assert_eq!((f.nvml_init)(), NVML_ERROR_NOT_SUPPORTED);
            assert_eq!((f.nvml_shutdown)(), NVML_ERROR_NOT_SUPPORTED);

            let mut buffer = [0u8; VERSION_BUFFER_SIZE];
            let ret = (f.nvml_system_get_nvml_version)(buffer.as_mut_ptr().cast(), 256);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert!(buffer.iter().all(|b| *b == 0));

            let ret = (f.nvml_system_get_driver_version)(buffer.as_mut_ptr().cast(), 256);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert!(buffer.iter().all(|b| *b == 0));

            let mut cuda_version: c_int = 0;
            let ret = (f.nvml_system_get_cuda_driver_version)(&mut cuda_version);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert_eq!(cuda_version, 0);

            let mut name = [0u8; PROCESS_NAME_BUFFER_SIZE];
            let ret = (f.nvml_system_get_process_name)(42, name.as_mut_ptr().cast(), 80);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert!(name.iter().all(|b| *b == 0));

            let mut count: c_uint = 0;
            assert_eq!((f.nvml_device_get_count)(&mut count), NVML_ERROR_NOT_SUPPORTED);
            assert_eq!(count, 0);

            let mut device: NvmlDeviceT = ptr::null_mut();
            let ret = (f.nvml_device_get_handle_by_index)(0, &mut device);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert!(device.is_null());

            let mut memory = NvmlMemoryT::default();
            let ret = (f.nvml_device_get_memory_info)(device, &mut memory);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert_eq!(memory, NvmlMemoryT::default());

            let mut bar1 = NvmlBar1MemoryT::default();
            let ret = (f.nvml_device_get_bar1_memory_info)(device, &mut bar1);
            assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
            assert_eq!(bar1, NvmlBar1MemoryT::default());

            let mut infos = [NvmlProcessInfoT::default(); 4];
            for query in [
                f.nvml_device_get_graphics_running_processes,
                f.nvml_device_get_compute_running_processes,
            ] {
                let mut count: c_uint = 4;
                let ret = query(device, &mut count, infos.as_mut_ptr());
                assert_eq!(ret, NVML_ERROR_NOT_SUPPORTED);
                assert_eq!(count, 4);
                assert!(infos.iter().all(|info| *info == NvmlProcessInfoT::default()));
            }
        }

        assert_eq!(table.report().missing, CATALOG.names().to_vec());
    }

    #[test_log::test]
    fn missing_error_string_still_describes_codes() {
        let table = table_with(MockLibrary::new());
        assert_eq!(table.error_string(NVML_ERROR_NOT_SUPPORTED), "Not Supported");
        assert_eq!(
            table.error_string(NVML_ERROR_DRIVER_NOT_LOADED),
            "Driver Not Loaded"
        );
        assert_eq!(
            table.check("nvmlInit", NVML_ERROR_GPU_IS_LOST).unwrap_err().to_string(),
            "nvmlInit failed (GPU is lost)"
        );

        let table = table_with(MockLibrary::new().with_symbol(
            "nvmlErrorString",
            error_string_null as FnNvmlErrorString as *const c_void,
        ));
        assert_eq!(table.error_string(NVML_ERROR_NOT_SUPPORTED), "Not Supported");
    }

    #[test_log::test]
    fn versioned_symbol_overrides_legacy_name() {
        let table = table_with(
            MockLibrary::new()
                .with_symbol("nvmlInit", legacy_init as FnNvmlInit as *const c_void)
                .with_symbol("nvmlInit_v2", init_v2 as FnNvmlInit as *const c_void)
                .with_symbol(
                    "nvmlSystemGetCudaDriverVersion",
                    cuda_version_legacy as FnNvmlSystemGetCudaDriverVersion as *const c_void,
                )
                .with_symbol(
                    "nvmlSystemGetCudaDriverVersion_v2",
                    cuda_version_v2 as FnNvmlSystemGetCudaDriverVersion as *const c_void,
                ),
        );

        let ret = unsafe { (table.functions().nvml_init)() };
        assert_eq!(ret, NVML_SUCCESS);
        assert_eq!(last_init(), "nvmlInit_v2");

        let mut version = 0;
        unsafe { (table.functions().nvml_system_get_cuda_driver_version)(&mut version) };
        assert_eq!(version, 12_040);

        assert_eq!(table.report().bound_symbol("nvmlInit"), Some("nvmlInit_v2"));
        assert!(table.is_resolved("nvmlInit"));
    }

    #[test_log::test]
    fn legacy_symbol_is_used_without_versioned_variant() {
        let table = table_with(
            MockLibrary::new()
                .with_symbol("nvmlInit", legacy_init as FnNvmlInit as *const c_void)
                .with_symbol(
                    "nvmlSystemGetCudaDriverVersion",
                    cuda_version_legacy as FnNvmlSystemGetCudaDriverVersion as *const c_void,
                ),
        );

        let ret = unsafe { (table.functions().nvml_init)() };
        assert_eq!(ret, NVML_SUCCESS);
        assert_eq!(last_init(), "nvmlInit");

        let mut version = 0;
        unsafe { (table.functions().nvml_system_get_cuda_driver_version)(&mut version) };
        assert_eq!(version, 10_010);

        assert_eq!(table.report().bound_symbol("nvmlInit"), Some("nvmlInit"));
        assert!(table.report().upgraded.is_empty());
    }

    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl SymbolSource for DropCounter {
        fn lookup(&self, _name: &str) -> Option<ptr::NonNull<c_void>> {
            None
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test_log::test]
    fn shutdown_twice_unloads_once() {
        let drops = Rc::new(Cell::new(0));
        let mut table = BindingTable::new();
        table
            .attach("counter", DropCounter { drops: drops.clone() })
            .expect("attach");
        assert!(table.is_loaded());

        table.shutdown();
        table.shutdown();
        assert!(!table.is_loaded());
        assert_eq!(drops.get(), 1);

        drop(table);
        assert_eq!(drops.get(), 1);
    }

    #[test_log::test]
    fn shutdown_without_library_is_noop() {
        let mut table = BindingTable::new();
        table.shutdown();
        table.shutdown();
        assert!(!table.is_loaded());
        assert_eq!(table.library_name(), None);
    }

    #[test_log::test]
    fn shut_down_table_answers_not_supported() {
        let mut table = table_with(
            MockLibrary::new().with_symbol("nvmlInit", legacy_init as FnNvmlInit as *const c_void),
        );
        table.shutdown();

        assert_eq!(unsafe { (table.functions().nvml_init)() }, NVML_ERROR_NOT_SUPPORTED);
        assert!(!table.is_resolved("nvmlInit"));
    }

    #[test_log::test]
    fn second_attach_is_rejected_and_keeps_first_library() {
        let drops = Rc::new(Cell::new(0));
        let mut table = table_with(MockLibrary::new());

        let err = table
            .attach("counter", DropCounter { drops: drops.clone() })
            .expect_err("second attach must fail");
        assert!(matches!(err, BindingError::AlreadyLoaded(ref name) if name == "mock"));
        assert_eq!(table.library_name(), Some("mock"));
        // the rejected source is dropped right away, not leaked into the table
        assert_eq!(drops.get(), 1);

        let err = table.initialize(None).expect_err("initialize must fail");
        assert!(matches!(err, BindingError::AlreadyLoaded(_)));
    }

    #[test_log::test]
    fn check_describes_failures() {
        let table = BindingTable::new();
        assert!(table.check("nvmlInit", NVML_SUCCESS).is_ok());

        let err = table
            .check("nvmlDeviceGetCount", NVML_ERROR_UNINITIALIZED)
            .unwrap_err();
        assert_eq!(err.code, NVML_ERROR_UNINITIALIZED);
        assert_eq!(
            err.to_string(),
            "nvmlDeviceGetCount failed (Uninitialized)"
        );
    }
}
