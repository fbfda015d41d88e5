use thiserror::Error;

use crate::ffi::NvmlReturnT;

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("failed to load NVML from any of [{}]: {source}", .candidates.join(", "))]
    Load {
        candidates: Vec<String>,
        source: libloading::Error,
    },

    #[error("NVML already loaded from `{0}`")]
    AlreadyLoaded(String),
}

/// A failed NVML call, with the library's own description of the status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{function} failed ({message})")]
pub struct NvmlError {
    pub function: &'static str,
    pub code: NvmlReturnT,
    pub message: String,
}
