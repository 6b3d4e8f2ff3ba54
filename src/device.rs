//! # Compute Device
//!
//! Places the acoustic scorer. `compute.device` names a preference; an
//! accelerator that is absent at runtime, or not compiled into candle,
//! resolves to the CPU so a model never fails to load over hardware.

use crate::error::{EngineError, EngineResult};
use candle_core::Device;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Outcome of `auto` detection, shared by every session in the process.
static DETECTED: OnceLock<Device> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DevicePreference {
    /// First accelerator that opens, else the CPU
    Auto,
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DevicePreference {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(EngineError::ConfigError(format!(
                "compute.device '{}' is not one of auto, cpu, cuda, metal",
                s
            ))),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Cuda => "cuda",
            DevicePreference::Metal => "metal",
        };
        f.write_str(name)
    }
}

/// Open the device the acoustic scorer runs on.
pub fn select(preference: DevicePreference) -> Device {
    let device = match preference {
        DevicePreference::Auto => DETECTED.get_or_init(detect).clone(),
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => open("cuda", Device::new_cuda(0)).unwrap_or(Device::Cpu),
        DevicePreference::Metal => open("metal", Device::new_metal(0)).unwrap_or(Device::Cpu),
    };
    tracing::debug!(requested = %preference, selected = label(&device), "acoustic scorer device");
    device
}

/// Name reported in `ModelInfo::device`.
pub fn label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

fn detect() -> Device {
    open("cuda", Device::new_cuda(0))
        .or_else(|| open("metal", Device::new_metal(0)))
        .unwrap_or(Device::Cpu)
}

fn open(backend: &'static str, opened: candle_core::Result<Device>) -> Option<Device> {
    match opened {
        Ok(device) => Some(device),
        Err(e) => {
            tracing::debug!(backend, error = %e, "accelerator unavailable");
            None
        }
    }
}
