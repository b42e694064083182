//! Runtime initialization and device management.

use crate::buffer::DeviceBuffer;
use crate::config::{DeviceKind, RuntimeConfig};
use crate::device::HostDevice;
use crate::engine::ModelInstance;
use crate::recorder::CommandRecorder;
use basalt_compiler::compile_model;
use basalt_core::{Accelerator, BufferBinding, Error, OperatorRegistry, Result};
use basalt_model::Model;
use basalt_operators::core_operator_registry;
use std::sync::Arc;

/// Main entry point for loading and running models.
///
/// Owns one accelerator and the operator catalog; every model loaded
/// through it shares both.
///
/// # Example
/// ```no_run
/// # use basalt_runtime::{Runtime, RuntimeConfig, Tensor};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = Runtime::new(RuntimeConfig::default())?;
/// let model = basalt_model::load_model("model.json")?;
/// let mut instance = runtime.load_model(&model)?;
///
/// instance.set_input_shapes(&[&[2, 2]])?;
/// let input = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2])?;
/// let outputs = instance.run_tensors(&[input])?;
/// println!("{:?}", outputs[0].to_vec::<f32>()?);
/// # Ok(())
/// # }
/// ```
pub struct Runtime {
    device: Arc<dyn Accelerator>,
    registry: Arc<OperatorRegistry>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create the device named by `config.device`.
    ///
    /// # Errors
    /// Returns `Error::Device` if the device cannot be initialized, or if a
    /// GPU is requested from a build without the `gpu` feature.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let device: Arc<dyn Accelerator> = match config.device {
            DeviceKind::Host => Arc::new(HostDevice::new()?),
            #[cfg(feature = "gpu")]
            DeviceKind::Gpu => Arc::new(pollster::block_on(crate::device::GpuDevice::new())?),
            #[cfg(not(feature = "gpu"))]
            DeviceKind::Gpu => {
                return Err(Error::Device(
                    "basalt-runtime was built without the `gpu` feature".to_string(),
                ))
            }
        };
        Ok(Self::with_device(config, device))
    }

    /// Initialize with the default GPU adapter without blocking.
    #[cfg(feature = "gpu")]
    pub async fn with_gpu(config: RuntimeConfig) -> Result<Self> {
        let device = crate::device::GpuDevice::new().await?;
        Ok(Self::with_device(config.with_device(DeviceKind::Gpu), Arc::new(device)))
    }

    /// Use an existing accelerator.
    pub fn with_device(config: RuntimeConfig, device: Arc<dyn Accelerator>) -> Self {
        tracing::info!(device = device.name(), "runtime ready");
        Self {
            registry: Arc::new(core_operator_registry(&config.catalog_options())),
            device,
            config,
        }
    }

    /// Compile `model` and initialize an instance of it.
    ///
    /// # Errors
    /// Any load-time error aborts the load; nothing stays allocated.
    #[tracing::instrument(skip_all, fields(model = %model.metadata.name))]
    pub fn load_model(&self, model: &Model) -> Result<ModelInstance> {
        let graph = compile_model(model, &self.registry, &self.device)?;
        ModelInstance::load(graph, self.config.device_timeout)
    }

    /// Allocate a zero-initialized device buffer for bindings kept across
    /// runs.
    pub fn create_buffer(&self, size: u64) -> Result<DeviceBuffer> {
        DeviceBuffer::new(&self.device, size)
    }

    /// Copy `data` to the start of `buffer`.
    pub fn upload(&self, buffer: &DeviceBuffer, data: &[u8]) -> Result<()> {
        if data.len() as u64 > buffer.size() {
            return Err(Error::BindingType(format!(
                "{} bytes do not fit a {}-byte buffer",
                data.len(),
                buffer.size()
            )));
        }
        let mut recorder = CommandRecorder::new();
        recorder.upload(BufferBinding::whole(buffer.handle(), data.len() as u64), data);
        recorder.submit_and_wait(self.device.as_ref(), self.config.device_timeout)?;
        Ok(())
    }

    /// Read the whole of `buffer` back to the host.
    pub fn download(&self, buffer: &DeviceBuffer) -> Result<Vec<u8>> {
        let mut recorder = CommandRecorder::new();
        recorder.readback(buffer.binding());
        let mut completion =
            recorder.submit_and_wait(self.device.as_ref(), self.config.device_timeout)?;
        completion
            .readbacks
            .pop()
            .ok_or_else(|| Error::Device("readback returned no data".to_string()))
    }

    pub fn device(&self) -> &Arc<dyn Accelerator> {
        &self.device
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("device", &self.device.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_runtime_round_trips_buffers() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        assert_eq!(runtime.device_name(), "host");

        let buffer = runtime.create_buffer(8).unwrap();
        runtime.upload(&buffer, &[1, 2, 3]).unwrap();
        assert_eq!(runtime.download(&buffer).unwrap(), vec![1, 2, 3, 0, 0, 0, 0, 0]);
        assert!(runtime.upload(&buffer, &[0; 9]).is_err());
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_requires_feature() {
        let config = RuntimeConfig::default().with_device(DeviceKind::Gpu);
        assert!(matches!(Runtime::new(config), Err(Error::Device(_))));
    }

    #[cfg(feature = "gpu")]
    #[pollster::test]
    #[ignore]
    async fn test_gpu_runtime_init() {
        let runtime = Runtime::with_gpu(RuntimeConfig::default()).await.unwrap();
        println!("GPU: {}", runtime.device_name());
    }
}
