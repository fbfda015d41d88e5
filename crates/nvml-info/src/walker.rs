//! One best-effort pass over the NVML session.
//!
//! Only a failed `nvmlInit` or `nvmlDeviceGetCount` stops the walk; every
//! other failed query is logged where it happens and leaves its field empty.

use nvml_dyn::{BindingTable, Device, NvmlError, ProcessKind, Session};

use crate::report::{DeviceInfo, ProcessInfo, SystemInfo};

/// Outcome of the walk, separate from the partial data it gathered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectStatus {
    Complete,
    /// `nvmlInit` failed; nothing was collected.
    SessionInitFailed(NvmlError),
    /// The device count was unavailable; version fields may still be set.
    EnumerationFailed(NvmlError),
}

impl CollectStatus {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CollectStatus::Complete)
    }

    pub fn error(&self) -> Option<&NvmlError> {
        match self {
            CollectStatus::Complete => None,
            CollectStatus::SessionInitFailed(err) | CollectStatus::EnumerationFailed(err) => {
                Some(err)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub info: SystemInfo,
    pub status: CollectStatus,
}

/// Unwraps a query result, logging the failure and substituting the default.
fn logged<T: Default>(result: Result<T, NvmlError>) -> T {
    result.unwrap_or_else(|err| {
        tracing::error!("{err}");
        T::default()
    })
}

/// Opens a session, gathers everything it can and closes the session again.
pub fn collect(table: &BindingTable) -> Collection {
    let mut info = SystemInfo::default();

    let session = match table.session() {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("{err}");
            return Collection {
                info,
                status: CollectStatus::SessionInitFailed(err),
            };
        }
    };

    info.nvml_version = logged(session.nvml_version());
    info.driver_version = logged(session.driver_version());
    info.cuda_version = logged(session.cuda_driver_version());

    let status = match session.device_count() {
        Ok(count) => {
            tracing::debug!("Discovered {} GPU device(s)", count);
            info.devices = (0..count).map(|index| collect_device(&session, index)).collect();
            CollectStatus::Complete
        }
        Err(err) => {
            tracing::error!("{err}");
            CollectStatus::EnumerationFailed(err)
        }
    };

    drop(session);
    Collection { info, status }
}

fn collect_device(session: &Session<'_>, index: u32) -> DeviceInfo {
    let device = match session.device_by_index(index) {
        Ok(device) => device,
        Err(err) => {
            tracing::error!(device = index, "{err}");
            return DeviceInfo::default();
        }
    };

    DeviceInfo {
        bar1_memory: logged(session.bar1_memory_info(&device)).into(),
        memory: logged(session.memory_info(&device)).into(),
        graphics_processes: collect_processes(session, &device, ProcessKind::Graphics),
        compute_processes: collect_processes(session, &device, ProcessKind::Compute),
    }
}

fn collect_processes(session: &Session<'_>, device: &Device, kind: ProcessKind) -> Vec<ProcessInfo> {
    let processes = match session.running_processes(device, kind) {
        Ok(processes) => processes,
        Err(err) => {
            tracing::error!(device = device.index(), "{err}");
            return Vec::new();
        }
    };

    tracing::debug!(
        device = device.index(),
        "{} {} process(es) running",
        processes.len(),
        kind
    );

    processes
        .iter()
        .map(|process| ProcessInfo {
            pid: process.pid,
            name: logged(session.process_name(process.pid)),
            used_gpu_memory: process.used_gpu_memory,
        })
        .collect()
}
