//! Runtime configuration.

use basalt_operators::{CatalogOptions, DEFAULT_MAX_FAN_IN};
use std::time::Duration;

/// Which accelerator a [`crate::Runtime`] drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// CPU reference device, always available.
    #[default]
    Host,
    /// wgpu compute device. Requires the `gpu` feature.
    Gpu,
}

/// Settings shared by every model loaded through one runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub device: DeviceKind,
    /// How long a submission may take before it counts as a device hang.
    /// `None` waits forever.
    pub device_timeout: Option<Duration>,
    /// Inputs combined per dispatch by variadic operators (at least 2).
    pub max_variadic_fan_in: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Host,
            device_timeout: Some(Duration::from_secs(30)),
            max_variadic_fan_in: DEFAULT_MAX_FAN_IN,
        }
    }
}

impl RuntimeConfig {
    pub fn with_device(mut self, device: DeviceKind) -> Self {
        self.device = device;
        self
    }

    pub fn with_device_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.device_timeout = timeout;
        self
    }

    pub fn with_max_variadic_fan_in(mut self, fan_in: usize) -> Self {
        self.max_variadic_fan_in = fan_in.max(2);
        self
    }

    /// Catalog options derived from this configuration.
    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            max_fan_in: self.max_variadic_fan_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.device, DeviceKind::Host);
        assert_eq!(config.device_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_variadic_fan_in, 4);
    }

    #[test]
    fn test_fan_in_is_clamped() {
        let config = RuntimeConfig::default().with_max_variadic_fan_in(1);
        assert_eq!(config.catalog_options().max_fan_in, 2);
    }
}
