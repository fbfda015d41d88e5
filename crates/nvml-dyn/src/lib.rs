//! Runtime binding of `libnvidia-ml`.
//!
//! The library is opened with `dlopen` instead of being linked, and each entry
//! point in [`catalog::CATALOG`] is resolved on its own. Entry points the
//! installed driver does not export are replaced by fallbacks returning
//! `NVML_ERROR_NOT_SUPPORTED`, and `_v2` variants take over their base name
//! when present, so [`BindingTable`] always offers the full function set.

pub mod catalog;
mod error;
mod fallback;
pub mod ffi;
pub mod library;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod session;
mod table;

pub use catalog::{NvmlFunctions, ResolveReport};
pub use error::{BindingError, NvmlError};
pub use library::SymbolSource;
pub use session::{Device, ProcessKind, Session};
pub use table::BindingTable;
