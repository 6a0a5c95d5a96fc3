use candle_core::Device;

/// Metal when built with the `metal` feature and a GPU is present, CPU otherwise.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            tracing::info!("embedding device: metal");
            return dev;
        }
    }
    tracing::info!("embedding device: cpu");
    Device::Cpu
}
