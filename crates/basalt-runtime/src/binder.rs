//! Resources a compiled graph needs while it runs.

use crate::buffer::DeviceBuffer;
use basalt_compiler::CompiledGraph;
use basalt_core::shape::align_up;
use basalt_core::{Accelerator, BindingProperties, BindingTable, BufferBinding, Error, Result};
use std::sync::Arc;

/// Owns the persistent, temporary and intermediate buffers of one model
/// instance and fills its binding tables.
///
/// The persistent buffer lives as long as the binder. The temporary buffer
/// is kept while it is large enough for the next request. Intermediate
/// buffers are allocated once, one per intermediate edge.
pub struct ResourceBinder {
    device: Arc<dyn Accelerator>,
    properties: BindingProperties,
    persistent: Option<DeviceBuffer>,
    temporary: Option<DeviceBuffer>,
    intermediates: Vec<DeviceBuffer>,
    table: BindingTable,
}

impl ResourceBinder {
    /// Allocate the persistent and intermediate buffers of `graph`.
    pub fn new(graph: &CompiledGraph, properties: BindingProperties) -> Result<Self> {
        let sizes = graph
            .intermediate_edges()
            .map(|edge| {
                let tensor = graph.tensor(edge.tensor_index).ok_or_else(|| {
                    Error::Compile(format!("edge references missing tensor {}", edge.tensor_index))
                })?;
                Ok(align_up(tensor.data_size() as u64, 4))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::with_sizes(graph.device(), properties, &sizes)
    }

    pub(crate) fn with_sizes(
        device: &Arc<dyn Accelerator>,
        properties: BindingProperties,
        intermediate_sizes: &[u64],
    ) -> Result<Self> {
        if intermediate_sizes.len() != properties.intermediate_count {
            return Err(Error::Compile(format!(
                "device expects {} intermediate buffers, graph has {}",
                properties.intermediate_count,
                intermediate_sizes.len()
            )));
        }

        let persistent = match properties.persistent_size {
            0 => None,
            size => Some(DeviceBuffer::new(device, size)?),
        };
        let intermediates = intermediate_sizes
            .iter()
            .map(|&size| DeviceBuffer::new(device, size))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            persistent = properties.persistent_size,
            intermediates = intermediates.len(),
            "allocated graph resources"
        );

        Ok(Self {
            device: Arc::clone(device),
            properties,
            persistent,
            temporary: None,
            intermediates,
            table: BindingTable::default(),
        })
    }

    pub fn properties(&self) -> &BindingProperties {
        &self.properties
    }

    /// Temporary buffer of at least `size` bytes, or `None` when no scratch
    /// space is needed.
    fn temporary(&mut self, size: u64) -> Result<Option<BufferBinding>> {
        if size == 0 {
            return Ok(None);
        }
        let reusable = self.temporary.as_ref().is_some_and(|t| t.size() >= size);
        if !reusable {
            tracing::debug!(size, "allocating temporary resource");
            self.temporary = Some(DeviceBuffer::new(&self.device, size)?);
        }
        Ok(self.temporary.as_ref().map(|t| BufferBinding::whole(t.handle(), size)))
    }

    /// Binding table for the one-time initialization.
    ///
    /// `inputs` holds one entry per graph input; only device-owned inputs
    /// need a buffer.
    pub fn initializer_table(&mut self, inputs: &[Option<BufferBinding>]) -> Result<&BindingTable> {
        let temporary = self.temporary(self.properties.initializer_temporary_size)?;
        self.table.reset(&self.properties);
        for (slot, &binding) in inputs.iter().enumerate() {
            self.table.bind_input(slot, binding)?;
        }
        self.table.persistent = self.persistent.as_ref().map(DeviceBuffer::binding);
        self.table.temporary = temporary;
        Ok(&self.table)
    }

    /// Binding table for one dispatch.
    ///
    /// Device-owned inputs are read from the persistent resource, so their
    /// entries in `inputs` stay `None`.
    pub fn dispatch_table(
        &mut self,
        inputs: &[Option<BufferBinding>],
        outputs: &[Option<BufferBinding>],
    ) -> Result<&BindingTable> {
        if inputs.len() != self.properties.input_count
            || outputs.len() != self.properties.output_count
        {
            return Err(Error::BindingArity(format!(
                "graph takes {} inputs and {} outputs, got {} and {}",
                self.properties.input_count,
                self.properties.output_count,
                inputs.len(),
                outputs.len()
            )));
        }

        let temporary = self.temporary(self.properties.temporary_size)?;
        self.table.reset(&self.properties);
        for (slot, &binding) in inputs.iter().enumerate() {
            self.table.bind_input(slot, binding)?;
        }
        for (slot, &binding) in outputs.iter().enumerate() {
            self.table.bind_output(slot, binding)?;
        }
        for (slot, buffer) in self.intermediates.iter().enumerate() {
            self.table.bind_intermediate(slot, Some(buffer.binding()))?;
        }
        self.table.persistent = self.persistent.as_ref().map(DeviceBuffer::binding);
        self.table.temporary = temporary;
        Ok(&self.table)
    }
}
