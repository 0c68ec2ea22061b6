/// Device helpers
use candle_core::{Device, Result};

/// Pick the first CUDA device when one is available, otherwise the CPU.
pub fn select_device() -> Result<Device> {
    if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else {
        Ok(Device::Cpu)
    }
}

/// Short label for diagnostics
pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}
