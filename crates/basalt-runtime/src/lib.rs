//! Execution engine for compiled basalt graphs.
//!
//! This crate loads models compiled by `basalt-compiler` onto an
//! accelerator and runs them synchronously.
//!
//! # Architecture
//!
//! The runtime manages four responsibilities:
//! 1. **Devices** - a CPU reference device, plus a wgpu device with the
//!    `gpu` feature, each with its own submission thread
//! 2. **Resource binding** - persistent, temporary and intermediate buffers
//!    per model instance
//! 3. **Initialization** - weights copied once into the persistent resource
//! 4. **Execution** - upload, dispatch and readback in one submission,
//!    waited on with a timeout
//!
//! # Example
//!
//! ```no_run
//! use basalt_runtime::{Binding, Runtime, RuntimeConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::new(RuntimeConfig::default())?;
//!     let model = basalt_model::load_model("model.json")?;
//!     let mut instance = runtime.load_model(&model)?;
//!
//!     let (x, y) = (model.inputs[0], model.outputs[0]);
//!     instance.set_input_shapes(&[&[4]])?;
//!
//!     let input: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
//!     let mut output = vec![0u8; 16];
//!     instance.run(
//!         &[Binding::cpu(x, bytemuck::cast_slice(&input))],
//!         &mut [Binding::cpu_mut(y, &mut output)],
//!     )?;
//!     Ok(())
//! }
//! ```

mod binder;
mod buffer;
mod config;
pub mod device;
mod engine;
mod error;
mod queue;
mod recorder;
mod runtime;
mod tensor;

pub use binder::ResourceBinder;
pub use buffer::DeviceBuffer;
pub use config::{DeviceKind, RuntimeConfig};
pub use engine::{Binding, BindingLocation, HostMemory, InstanceState, ModelInstance};
pub use error::{Error, Result, ResultCode};
pub use runtime::Runtime;
pub use tensor::{Element, Tensor};
