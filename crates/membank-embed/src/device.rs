use candle_core::Device;
use tracing::info;

/// Pick the inference device. Metal when the feature is enabled and a GPU
/// is present, CPU otherwise. Device choice never changes embedding values,
/// only throughput.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: Metal");
            return dev;
        }
    }
    info!("embedding device: CPU");
    Device::Cpu
}
