//! Compute backend selection and precision policy

mod resolver;

use std::fmt;

use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StartupError};

pub use resolver::{resolve, resolve_preferred, resolve_with, DeviceProbe, SystemProbe};

/// The backend that model weights and computation live on.
///
/// Chosen once per process and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// Discrete accelerator
    Cuda,
    /// Integrated/on-chip accelerator
    Metal,
    /// Always-available fallback
    Cpu,
}

impl ComputeBackend {
    pub fn is_accelerator(self) -> bool {
        !matches!(self, ComputeBackend::Cpu)
    }

    /// Open the candle device for this backend (ordinal 0)
    pub fn device(self) -> Result<Device> {
        let opened = match self {
            ComputeBackend::Cuda => Device::new_cuda(0),
            ComputeBackend::Metal => Device::new_metal(0),
            ComputeBackend::Cpu => return Ok(Device::Cpu),
        };
        opened.map_err(|e| StartupError::Device {
            backend: self,
            message: e.to_string(),
        })
    }
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeBackend::Cuda => write!(f, "cuda"),
            ComputeBackend::Metal => write!(f, "metal"),
            ComputeBackend::Cpu => write!(f, "cpu"),
        }
    }
}

/// Numeric precision for model weights on a backend.
///
/// Reduced precision off-CPU, full precision on the CPU fallback.
pub fn precision_for(backend: ComputeBackend) -> DType {
    if backend.is_accelerator() {
        DType::F16
    } else {
        DType::F32
    }
}
