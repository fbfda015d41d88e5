use std::ffi::{c_void, OsStr, OsString};
use std::ptr::NonNull;

use libloading::Library;

use crate::error::BindingError;

pub const PRIMARY_NVML_LIB: &str = "libnvidia-ml.so.1";
pub const NVML_FALLBACK_LIB: &str = "libnvidia-ml.so";

/// Anything symbols can be looked up in by name.
pub trait SymbolSource {
    fn lookup(&self, name: &str) -> Option<NonNull<c_void>>;
}

impl SymbolSource for Library {
    fn lookup(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is read as an untyped address; it is only cast to
        // a callable type by the catalog.
        let symbol = unsafe { self.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }
}

/// Library names tried in order: the caller's explicit path first, then the
/// versioned soname, then the development symlink.
pub fn candidates(explicit: Option<&OsStr>) -> Vec<OsString> {
    let mut candidates: Vec<OsString> = Vec::with_capacity(3);

    if let Some(path) = explicit {
        candidates.push(path.to_os_string());
    }

    candidates.push(OsStr::new(PRIMARY_NVML_LIB).to_os_string());
    candidates.push(OsStr::new(NVML_FALLBACK_LIB).to_os_string());
    candidates
}

/// Opens the first default candidate that loads, returning it with its name.
pub fn open_nvml(explicit: Option<&OsStr>) -> Result<(Library, String), BindingError> {
    open_first(&candidates(explicit))
}

/// Tries `candidates` in order; the error carries the last loader diagnostic.
pub fn open_first(candidates: &[OsString]) -> Result<(Library, String), BindingError> {
    let mut last_err: Option<libloading::Error> = None;

    for candidate in candidates {
        let candidate_display = candidate.to_string_lossy();
        tracing::info!("Loading NVML library from {}", candidate_display);
        match open(candidate) {
            Ok(lib) => return Ok((lib, candidate_display.into_owned())),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load {}", candidate_display);
                last_err = Some(err);
            }
        }
    }

    Err(BindingError::Load {
        candidates: candidates
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect(),
        source: last_err.unwrap_or(libloading::Error::DlOpenUnknown),
    })
}

#[cfg(unix)]
fn open(name: &OsStr) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // SAFETY: loading NVML runs no initialisers with preconditions on our side.
    unsafe { UnixLibrary::open(Some(name), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open(name: &OsStr) -> Result<Library, libloading::Error> {
    // SAFETY: see the unix variant.
    unsafe { Library::new(name) }
}
