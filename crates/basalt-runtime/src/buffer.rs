//! Device buffers owned by the runtime.

use basalt_core::shape::align_up;
use basalt_core::{Accelerator, BufferBinding, BufferHandle, Result};
use std::sync::Arc;

/// A device buffer released when dropped.
pub struct DeviceBuffer {
    device: Arc<dyn Accelerator>,
    handle: BufferHandle,
    size: u64,
}

impl DeviceBuffer {
    /// Allocate a zero-initialized buffer of `size` bytes on `device`.
    ///
    /// The allocation is rounded up to whole 32-bit words; kernels bind
    /// the rounded range.
    pub fn new(device: &Arc<dyn Accelerator>, size: u64) -> Result<Self> {
        let handle = device.create_buffer(align_up(size, 4))?;
        tracing::trace!(buffer = handle.0, size, "allocated device buffer");
        Ok(Self {
            device: Arc::clone(device),
            handle,
            size,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Binding covering the whole buffer.
    pub fn binding(&self) -> BufferBinding {
        BufferBinding::whole(self.handle, self.size)
    }

    /// Binding of the first `len` bytes widened to whole words, as kernels
    /// read and write them.
    pub(crate) fn word_binding(&self, len: u64) -> BufferBinding {
        BufferBinding::whole(self.handle, align_up(len, 4))
    }

    /// True if this buffer was allocated on `device`.
    pub(crate) fn belongs_to(&self, device: &Arc<dyn Accelerator>) -> bool {
        Arc::ptr_eq(&self.device, device)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.device.release_buffer(self.handle);
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device.name())
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish()
    }
}
