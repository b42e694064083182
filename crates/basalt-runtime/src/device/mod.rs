//! Reference accelerators.
//!
//! [`HostDevice`] interprets device graphs on the CPU and is always
//! available. [`GpuDevice`] runs them through wgpu compute shaders and is
//! built with the `gpu` feature.

pub(crate) mod kernels;
mod plan;

pub mod host;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use host::{HOST_PERSISTENT_ALIGNMENT, HostDevice};
#[cfg(feature = "gpu")]
pub use gpu::{GPU_PERSISTENT_ALIGNMENT, GpuDevice};
