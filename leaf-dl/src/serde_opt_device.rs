//! Serialize `Option<Device>` with the `tch-serde` device format.

use crate::common::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DeviceWrapper(#[serde(with = "tch_serde::serde_device")] Device);

pub fn serialize<S>(device: &Option<Device>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    device.map(DeviceWrapper).serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Device>, D::Error>
where
    D: Deserializer<'de>,
{
    let device = Option::<DeviceWrapper>::deserialize(deserializer)?;
    Ok(device.map(|DeviceWrapper(device)| device))
}

/// Returns the configured device, or CUDA when available.
pub fn resolve(device: Option<Device>) -> Device {
    device.unwrap_or_else(Device::cuda_if_available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super", default)]
        device: Option<Device>,
    }

    #[test]
    fn optional_device() -> Result<()> {
        let wrapper: Wrapper = serde_json::from_str(r#"{ "device": "cpu" }"#)?;
        assert_eq!(wrapper.device, Some(Device::Cpu));

        let text = serde_json::to_string(&Wrapper {
            device: Some(Device::Cuda(1)),
        })?;
        let wrapper: Wrapper = serde_json::from_str(&text)?;
        assert_eq!(wrapper.device, Some(Device::Cuda(1)));

        let wrapper: Wrapper = serde_json::from_str("{}")?;
        assert_eq!(wrapper.device, None);
        assert_eq!(resolve(Some(Device::Cpu)), Device::Cpu);
        Ok(())
    }
}
