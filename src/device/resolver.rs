use candle_core::Device;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::ComputeBackend;
use crate::config::DevicePreference;
use crate::error::Result;

/// Reports which accelerators the host can actually use
pub trait DeviceProbe {
    fn cuda_available(&self) -> bool;
    fn metal_available(&self) -> bool;

    /// Device handle for a resolved backend
    fn open(&self, backend: ComputeBackend) -> Result<Device> {
        backend.device()
    }
}

/// Probe backed by candle's runtime checks.
///
/// A backend counts as usable only if candle was built with it and device 0
/// opens successfully. The device opened by a successful check is kept and
/// handed out by [`DeviceProbe::open`].
#[derive(Debug, Default)]
pub struct SystemProbe {
    opened: Mutex<Option<(ComputeBackend, Device)>>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_open(&self, backend: ComputeBackend, compiled: bool) -> bool {
        if !compiled {
            return false;
        }
        match backend.device() {
            Ok(device) => {
                *self.opened.lock() = Some((backend, device));
                true
            }
            Err(_) => false,
        }
    }
}

impl DeviceProbe for SystemProbe {
    fn cuda_available(&self) -> bool {
        self.try_open(ComputeBackend::Cuda, candle_core::utils::cuda_is_available())
    }

    fn metal_available(&self) -> bool {
        self.try_open(ComputeBackend::Metal, candle_core::utils::metal_is_available())
    }

    fn open(&self, backend: ComputeBackend) -> Result<Device> {
        if let Some((opened, device)) = self.opened.lock().as_ref() {
            if *opened == backend {
                return Ok(device.clone());
            }
        }
        backend.device()
    }
}

/// Pick the backend for this host
pub fn resolve() -> ComputeBackend {
    resolve_with(&SystemProbe::new())
}

/// Pick a backend in priority order: CUDA, then Metal, then CPU.
pub fn resolve_with(probe: &dyn DeviceProbe) -> ComputeBackend {
    let backend = if probe.cuda_available() {
        ComputeBackend::Cuda
    } else if probe.metal_available() {
        ComputeBackend::Metal
    } else {
        ComputeBackend::Cpu
    };

    info!(backend = %backend, "Using device: {}", backend);
    backend
}

/// Resolve honoring a configured preference.
///
/// A pinned accelerator that is not usable falls back to the CPU.
pub fn resolve_preferred(preference: DevicePreference, probe: &dyn DeviceProbe) -> ComputeBackend {
    let pinned = match preference {
        DevicePreference::Auto => return resolve_with(probe),
        DevicePreference::Cpu => ComputeBackend::Cpu,
        DevicePreference::Cuda if probe.cuda_available() => ComputeBackend::Cuda,
        DevicePreference::Metal if probe.metal_available() => ComputeBackend::Metal,
        DevicePreference::Cuda | DevicePreference::Metal => {
            warn!(preference = %preference, "requested device is not available, falling back to cpu");
            ComputeBackend::Cpu
        }
    };

    info!(backend = %pinned, "Using device: {}", pinned);
    pinned
}
